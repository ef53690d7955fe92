//! Turn pipeline
//!
//! Pure sequencing for one conversational turn. Recognition failures are
//! non-transient and abort immediately; generation is retried on a fixed
//! backoff and falls back to a canned reply; synthesis failures abort.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;

use voicelink_core::{
    ResponseGenerator, Result as CoreResult, SpeechRecognizer, SpeechSynthesizer,
    SynthesizedSpeech, TurnRecord, Utterance,
};

use crate::{InferenceGate, Stage, StageError};

/// Retry and fallback policy for the generation stage
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Total generation attempts per turn
    pub max_attempts: u32,
    /// Fixed backoff between attempts
    pub retry_backoff: Duration,
    /// Canned reply substituted when every attempt fails
    pub fallback_reply: String,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_secs(2),
            fallback_reply: "Sorry, I can't handle that request right now.".to_string(),
        }
    }
}

/// Result of a successful turn: the record plus the reply audio
#[derive(Debug)]
pub struct CompletedTurn {
    pub record: TurnRecord,
    pub audio: SynthesizedSpeech,
}

/// Orchestrates recognition → generation → synthesis for one utterance
pub struct TurnPipeline {
    recognizer: Arc<dyn SpeechRecognizer>,
    generator: Arc<dyn ResponseGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    gate: InferenceGate,
    config: TurnConfig,
}

impl TurnPipeline {
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        generator: Arc<dyn ResponseGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        gate: InferenceGate,
        config: TurnConfig,
    ) -> Self {
        Self {
            recognizer,
            generator,
            synthesizer,
            gate,
            config,
        }
    }

    /// Run one turn
    ///
    /// Takes the utterance by value: it is consumed by recognition and
    /// dropped, never reused.
    pub async fn run(&self, utterance: Utterance) -> Result<CompletedTurn, StageError> {
        let started_at = Utc::now();

        let transcript = {
            let _permit = self.gate.acquire().await;
            self.recognizer
                .transcribe(&utterance)
                .await
                .map_err(|e| StageError::new(Stage::Recognition, e))?
        };
        drop(utterance);

        if transcript.trim().is_empty() {
            return Err(StageError::new(
                Stage::Recognition,
                voicelink_core::Error::Recognition("Empty transcript".to_string()),
            ));
        }
        tracing::info!(model = %self.recognizer.model_name(), "Recognized: {}", transcript);

        let response_text = self.generate_with_retry(&transcript).await;

        let audio = {
            let _permit = self.gate.acquire().await;
            self.synthesizer
                .synthesize(&response_text)
                .await
                .map_err(|e| StageError::new(Stage::Synthesis, e))?
        };
        tracing::debug!(
            reply_bytes = audio.pcm.len(),
            model = %self.synthesizer.model_name(),
            "Synthesis complete"
        );

        Ok(CompletedTurn {
            record: TurnRecord::new(transcript, response_text, started_at),
            audio,
        })
    }

    /// Bounded-retry generation with canned fallback
    ///
    /// Never fails the turn: after `max_attempts` failures the configured
    /// fallback reply is substituted.
    async fn generate_with_retry(&self, transcript: &str) -> String {
        for attempt in 1..=self.config.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.config.retry_backoff).await;
            }

            match self.attempt_generation(transcript).await {
                Ok(text) if !text.trim().is_empty() => {
                    tracing::debug!(attempt, "Generation succeeded");
                    return text;
                }
                Ok(_) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        "Generator produced an empty reply"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "Generation attempt failed"
                    );
                }
            }
        }

        tracing::warn!("All generation attempts failed, substituting canned reply");
        self.config.fallback_reply.clone()
    }

    /// One generation attempt: accumulate the fragment stream to completion
    async fn attempt_generation(&self, transcript: &str) -> CoreResult<String> {
        let mut fragments = self.generator.generate(transcript).await?;
        let mut text = String::new();
        while let Some(fragment) = fragments.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}
