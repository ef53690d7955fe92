//! Core traits and types for the voicelink speech server
//!
//! This crate provides the foundational types used across all other crates:
//! - Collaborator traits for pluggable backends (wake/ASR, generation, TTS, turn log)
//! - PCM audio accumulation and the utterance model
//! - Turn records
//! - Error types

pub mod audio;
pub mod error;
pub mod traits;
pub mod turn;

pub use audio::{AudioSpec, FinalizeError, SynthesizedSpeech, Utterance, UtteranceBuffer};
pub use error::{Error, Result};
pub use turn::TurnRecord;

pub use traits::{
    // Wake detection + recognition
    SpeechRecognizer,
    // Synthesis
    SpeechSynthesizer,
    // Response generation
    ResponseGenerator, TextFragmentStream,
    // Turn history
    TurnLogger,
};
