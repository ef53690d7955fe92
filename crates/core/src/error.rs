//! Error types

use thiserror::Error;

/// Result alias used throughout the workspace
pub type Result<T> = std::result::Result<T, Error>;

/// Core errors
///
/// Per-subsystem string variants so collaborator crates can convert their
/// own error enums into a shared shape at the crate boundary.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Turn log error: {0}")]
    TurnLog(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
