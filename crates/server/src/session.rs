//! Session state
//!
//! A [`Session`] is exclusively owned by the task driving its connection;
//! its phase only ever changes through [`Session::transition`], and the
//! reset back to idle between turns happens in exactly one place,
//! [`Session::reset_for_next_turn`]. The listener-side [`SessionRegistry`]
//! only holds metadata and never touches live session state.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use voicelink_core::{AudioSpec, Result as CoreResult, SpeechRecognizer, UtteranceBuffer};

use crate::ServerError;

/// Connection phase
///
/// Initial phase is `Idle`; there is no terminal phase while the
/// connection is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Awaiting wake detection on streamed chunks
    Idle,
    /// Receiving the full utterance into the accumulator
    Capturing,
    /// Running the turn pipeline
    Processing,
    /// Streaming the synthesized reply back
    Replying,
}

impl Phase {
    /// Whether moving to `next` is a legal edge of the state machine
    pub fn can_transition(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Idle, Phase::Capturing)
                | (Phase::Capturing, Phase::Processing)
                | (Phase::Capturing, Phase::Idle)
                | (Phase::Processing, Phase::Replying)
                | (Phase::Processing, Phase::Idle)
                | (Phase::Replying, Phase::Idle)
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Capturing => write!(f, "capturing"),
            Phase::Processing => write!(f, "processing"),
            Phase::Replying => write!(f, "replying"),
        }
    }
}

/// Per-connection session state
pub struct Session {
    id: String,
    peer: SocketAddr,
    phase: Phase,
    accumulator: UtteranceBuffer,
    last_transcript: Option<String>,
    turn_count: u64,
    created_at: Instant,
}

impl Session {
    pub fn new(peer: SocketAddr, spec: AudioSpec, min_utterance: Duration) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            peer,
            phase: Phase::Idle,
            accumulator: UtteranceBuffer::new(spec, min_utterance),
            last_transcript: None,
            turn_count: 0,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn accumulator(&self) -> &UtteranceBuffer {
        &self.accumulator
    }

    pub fn accumulator_mut(&mut self) -> &mut UtteranceBuffer {
        &mut self.accumulator
    }

    pub fn turn_count(&self) -> u64 {
        self.turn_count
    }

    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Record the transcript of the most recent recognition
    pub fn note_transcript(&mut self, transcript: impl Into<String>) {
        self.last_transcript = Some(transcript.into());
    }

    pub fn last_transcript(&self) -> Option<&str> {
        self.last_transcript.as_deref()
    }

    /// Move to the next phase, enforcing the legal edges
    pub fn transition(&mut self, next: Phase) -> Result<(), ServerError> {
        if !self.phase.can_transition(next) {
            return Err(ServerError::IllegalTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!(session_id = %self.id, from = %self.phase, to = %next, "Phase transition");
        self.phase = next;
        Ok(())
    }

    /// Reset the session for the next turn
    ///
    /// The single place where a turn's leftover state is cleared: the
    /// audio accumulator, the collaborator-side wake-detector context,
    /// and the phase. Invoked after a completed reply and after every
    /// soft failure.
    pub async fn reset_for_next_turn(
        &mut self,
        recognizer: &dyn SpeechRecognizer,
    ) -> CoreResult<()> {
        self.accumulator.clear();
        recognizer.reset_stream(&self.id).await?;
        if self.phase != Phase::Idle {
            tracing::debug!(session_id = %self.id, from = %self.phase, "Resetting to idle");
            self.phase = Phase::Idle;
        }
        Ok(())
    }

    /// Count a completed turn
    pub fn complete_turn(&mut self) {
        self.turn_count += 1;
    }
}

/// Listener-side record of a live session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub peer: SocketAddr,
    pub connected_at: Instant,
}

/// Registry of live sessions, keyed by session id
///
/// Mutated only at the connection boundary: the listener registers on
/// accept and the session task unregisters on close.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionInfo>>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Register a newly accepted session
    pub fn register(&self, info: SessionInfo) -> Result<(), ServerError> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_sessions {
            return Err(ServerError::Session("Max sessions reached".to_string()));
        }
        sessions.insert(info.id.clone(), info);
        Ok(())
    }

    /// Drop a session's record when its connection closes
    pub fn unregister(&self, id: &str) {
        self.sessions.write().remove(id);
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }
}
