//! Turn pipeline and speech-engine adapters
//!
//! The [`TurnPipeline`] sequences one conversational turn: recognition →
//! generation (with bounded retry) → synthesis. It owns no I/O of its own;
//! the session state machine drives it and performs all transport actions.
//!
//! The `stt` and `tts` modules hold HTTP adapters for the external
//! wake/ASR and synthesizer services.

pub mod gate;
pub mod stt;
pub mod tts;
pub mod turn;

pub use gate::InferenceGate;
pub use stt::{HttpSpeechRecognizer, SttServiceConfig};
pub use tts::{HttpSpeechSynthesizer, TtsServiceConfig};
pub use turn::{CompletedTurn, TurnConfig, TurnPipeline};

use thiserror::Error;

/// Pipeline stages, for error attribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Recognition,
    Generation,
    Synthesis,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Recognition => write!(f, "recognition"),
            Stage::Generation => write!(f, "generation"),
            Stage::Synthesis => write!(f, "synthesis"),
        }
    }
}

/// A turn aborted at a specific stage
#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: voicelink_core::Error,
}

impl StageError {
    pub fn new(stage: Stage, source: voicelink_core::Error) -> Self {
        Self { stage, source }
    }
}

/// Adapter construction errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),
}
