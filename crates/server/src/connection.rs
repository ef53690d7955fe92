//! Per-connection session driver
//!
//! Owns one [`Session`] and its stream, and walks the phase machine:
//! wake detection while idle, full-utterance capture, the turn pipeline,
//! and reply streaming. Soft failures (timeouts, short captures, stage
//! errors) notify the client and regress to idle; transport failures end
//! the session. Nothing here can affect any other session.

use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};

use voicelink_core::{FinalizeError, Utterance};
use voicelink_pipeline::CompletedTurn;
use voicelink_transport::{tokens, FrameRead, TransportError};

use crate::session::{Phase, Session};
use crate::state::AppState;

/// Why a session ended
#[derive(Debug)]
pub enum EndReason {
    PeerClosed,
    IdleTimeout,
    ProtocolViolation(String),
    Io(String),
    Internal(String),
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndReason::PeerClosed => write!(f, "peer closed"),
            EndReason::IdleTimeout => write!(f, "idle timeout"),
            EndReason::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
            EndReason::Io(msg) => write!(f, "i/o error: {}", msg),
            EndReason::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

/// Drives one connection's session state machine
pub struct ConnectionDriver<S> {
    state: AppState,
    session: Session,
    stream: S,
}

impl<S> ConnectionDriver<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(state: AppState, session: Session, stream: S) -> Self {
        Self {
            state,
            session,
            stream,
        }
    }

    /// Run the session until the connection ends
    pub async fn run(mut self) {
        let session_id = self.session.id().to_string();

        if let Err(e) = self
            .state
            .collaborators
            .recognizer
            .create_stream(&session_id)
            .await
        {
            tracing::error!(session_id = %session_id, error = %e, "Failed to create wake stream");
            return;
        }

        let reason = self.session_loop().await;

        if let Err(e) = self
            .state
            .collaborators
            .recognizer
            .destroy_stream(&session_id)
            .await
        {
            tracing::warn!(session_id = %session_id, error = %e, "Wake stream teardown failed");
        }

        tracing::info!(
            session_id = %session_id,
            turns = self.session.turn_count(),
            reason = %reason,
            "Session ended"
        );
    }

    async fn session_loop(&mut self) -> EndReason {
        loop {
            if let Err(reason) = self.run_turn().await {
                return reason;
            }
        }
    }

    /// One pass through the state machine
    ///
    /// Soft failures regress to idle internally and return `Ok`; hard
    /// failures end the session.
    async fn run_turn(&mut self) -> Result<(), EndReason> {
        self.await_wake().await?;

        let utterance = match self.capture_utterance().await? {
            Some(utterance) => utterance,
            None => return Ok(()),
        };

        let completed = match self.process(utterance).await? {
            Some(completed) => completed,
            None => return Ok(()),
        };

        self.reply(completed).await
    }

    /// `Idle`: feed chunks to the wake detector until it confirms
    async fn await_wake(&mut self) -> Result<(), EndReason> {
        debug_assert_eq!(self.session.phase(), Phase::Idle);
        let idle_timeout = self.state.settings.server.idle_timeout();

        loop {
            match self
                .state
                .codec
                .read_frame(&mut self.stream, idle_timeout)
                .await
            {
                Ok(FrameRead::Payload(chunk)) => {
                    let confirmed = {
                        let _permit = self.state.gate.acquire().await;
                        self.state
                            .collaborators
                            .recognizer
                            .process_chunk(self.session.id(), &chunk)
                            .await
                    };
                    match confirmed {
                        Ok(true) => {
                            tokens::send(&mut self.stream, tokens::WAKE_CONFIRMED)
                                .await
                                .map_err(|e| EndReason::Io(e.to_string()))?;
                            self.transition(Phase::Capturing)?;
                            tracing::info!(session_id = %self.session.id(), "Wake confirmed");
                            return Ok(());
                        }
                        Ok(false) => {}
                        Err(e) => {
                            tracing::warn!(
                                session_id = %self.session.id(),
                                error = %e,
                                "Wake detection failed on chunk"
                            );
                        }
                    }
                }
                Ok(FrameRead::EndOfMessage) => {
                    // Stray sentinel from an aborted message
                    tracing::debug!(session_id = %self.session.id(), "Ignoring sentinel while idle");
                }
                Err(TransportError::Timeout) => return Err(EndReason::IdleTimeout),
                Err(e) => return Err(hard_end(e)),
            }
        }
    }

    /// `Capturing`: accumulate frames until the sentinel or a timeout
    async fn capture_utterance(&mut self) -> Result<Option<Utterance>, EndReason> {
        debug_assert_eq!(self.session.phase(), Phase::Capturing);
        let header_timeout = self.state.settings.protocol.header_timeout();
        let deadline = Instant::now() + self.state.settings.audio.capture_timeout();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!(session_id = %self.session.id(), "Capture timed out");
                self.soft_reset().await?;
                return Ok(None);
            }

            match self
                .state
                .codec
                .read_frame(&mut self.stream, header_timeout.min(remaining))
                .await
            {
                Ok(FrameRead::Payload(chunk)) => {
                    self.session.accumulator_mut().accept(&chunk);
                }
                Ok(FrameRead::EndOfMessage) => break,
                Err(TransportError::Timeout) => {
                    tracing::warn!(
                        session_id = %self.session.id(),
                        accumulated = self.session.accumulator().len(),
                        "Capture timed out waiting for frame"
                    );
                    self.soft_reset().await?;
                    return Ok(None);
                }
                Err(e) => return Err(hard_end(e)),
            }
        }

        match self.session.accumulator_mut().finalize() {
            Ok(utterance) => {
                tokens::send(&mut self.stream, tokens::DATA_RECEIVED)
                    .await
                    .map_err(|e| EndReason::Io(e.to_string()))?;
                self.archive_utterance(&utterance);
                self.transition(Phase::Processing)?;
                tracing::info!(
                    session_id = %self.session.id(),
                    bytes = utterance.len(),
                    duration_ms = utterance.duration().as_millis() as u64,
                    "Utterance captured"
                );
                Ok(Some(utterance))
            }
            Err(FinalizeError::InsufficientData { got, need }) => {
                tracing::warn!(session_id = %self.session.id(), got, need, "Utterance too short");
                self.soft_reset().await?;
                Ok(None)
            }
        }
    }

    /// `Processing`: run the turn pipeline and log the completed turn
    async fn process(&mut self, utterance: Utterance) -> Result<Option<CompletedTurn>, EndReason> {
        debug_assert_eq!(self.session.phase(), Phase::Processing);

        match self.state.pipeline.run(utterance).await {
            Ok(completed) => {
                self.session
                    .note_transcript(completed.record.transcript.clone());
                if let Err(e) = self
                    .state
                    .collaborators
                    .turn_logger
                    .append_turn(&completed.record)
                    .await
                {
                    tracing::warn!(session_id = %self.session.id(), error = %e, "Turn log append failed");
                }
                self.transition(Phase::Replying)?;
                Ok(Some(completed))
            }
            Err(stage_err) => {
                tracing::warn!(
                    session_id = %self.session.id(),
                    stage = %stage_err.stage,
                    error = %stage_err,
                    "Turn aborted"
                );
                self.soft_reset().await?;
                Ok(None)
            }
        }
    }

    /// `Replying`: stream the reply, acknowledge, reset for the next turn
    async fn reply(&mut self, completed: CompletedTurn) -> Result<(), EndReason> {
        debug_assert_eq!(self.session.phase(), Phase::Replying);

        self.state
            .codec
            .write_message(&mut self.stream, &completed.audio.pcm)
            .await
            .map_err(hard_end)?;
        tokens::send(&mut self.stream, tokens::REPLY_COMPLETE)
            .await
            .map_err(|e| EndReason::Io(e.to_string()))?;

        self.session.complete_turn();
        tracing::info!(
            session_id = %self.session.id(),
            turn = self.session.turn_count(),
            reply_bytes = completed.audio.pcm.len(),
            "Reply streamed"
        );

        self.session
            .reset_for_next_turn(self.state.collaborators.recognizer.as_ref())
            .await
            .map_err(|e| EndReason::Internal(format!("Session reset failed: {}", e)))
    }

    /// Notify the client and regress to idle after a soft failure
    async fn soft_reset(&mut self) -> Result<(), EndReason> {
        tokens::send(&mut self.stream, tokens::STAGE_ERROR)
            .await
            .map_err(|e| EndReason::Io(e.to_string()))?;
        self.session
            .reset_for_next_turn(self.state.collaborators.recognizer.as_ref())
            .await
            .map_err(|e| EndReason::Internal(format!("Session reset failed: {}", e)))
    }

    /// Write the recognition artifact for this turn; archival only, so
    /// failures never fail the turn
    fn archive_utterance(&self, utterance: &Utterance) {
        let path = std::path::Path::new(&self.state.settings.audio.scratch_dir)
            .join(format!("{}.wav", self.session.id()));
        if let Err(e) = utterance.write_wav(&path) {
            tracing::warn!(
                session_id = %self.session.id(),
                path = %path.display(),
                error = %e,
                "Failed to write scratch WAV"
            );
        }
    }

    fn transition(&mut self, next: Phase) -> Result<(), EndReason> {
        self.session
            .transition(next)
            .map_err(|e| EndReason::Internal(e.to_string()))
    }
}

fn hard_end(err: TransportError) -> EndReason {
    match err {
        TransportError::ConnectionClosed => EndReason::PeerClosed,
        TransportError::ProtocolViolation(msg) => EndReason::ProtocolViolation(msg),
        TransportError::Timeout => EndReason::IdleTimeout,
        TransportError::Io(e) => EndReason::Io(e.to_string()),
    }
}
