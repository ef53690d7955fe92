//! Reply generation via Ollama
//!
//! Features:
//! - Streaming token generation (NDJSON over HTTP)
//! - Prompt assembly with an optional system preamble

pub mod backend;
pub mod prompt;

pub use backend::{LlmConfig, OllamaBackend};
pub use prompt::PromptBuilder;

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for voicelink_core::Error {
    fn from(err: LlmError) -> Self {
        voicelink_core::Error::Generation(err.to_string())
    }
}
