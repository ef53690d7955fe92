//! Collaborator traits
//!
//! The server consumes its ML components and the turn log through these
//! narrow interfaces only; implementations live in the adapter crates.

pub mod llm;
pub mod logger;
pub mod speech;

pub use llm::{ResponseGenerator, TextFragmentStream};
pub use logger::TurnLogger;
pub use speech::{SpeechRecognizer, SpeechSynthesizer};
