//! Wake/ASR engine adapters

mod http;

pub use http::{HttpSpeechRecognizer, SttServiceConfig};
