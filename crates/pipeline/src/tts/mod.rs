//! Synthesizer adapters

mod http;

pub use http::{HttpSpeechSynthesizer, TtsServiceConfig};
