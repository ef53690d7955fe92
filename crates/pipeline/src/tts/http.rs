//! HTTP synthesizer backend
//!
//! Sends reply text to an external TTS service and receives raw PCM in
//! the capture format back.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use voicelink_core::{AudioSpec, Error, Result, SpeechSynthesizer, SynthesizedSpeech};

use crate::PipelineError;

/// TTS service configuration
#[derive(Debug, Clone)]
pub struct TtsServiceConfig {
    /// Base URL of the TTS service
    pub url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// PCM format the service produces
    pub output_spec: AudioSpec,
    /// Voice/model identifier reported for logging
    pub voice: String,
}

impl Default for TtsServiceConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8091".to_string(),
            timeout: Duration::from_secs(30),
            output_spec: AudioSpec::default(),
            voice: "default".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'a str,
    sample_rate: u32,
}

/// HTTP synthesizer backend
pub struct HttpSpeechSynthesizer {
    config: TtsServiceConfig,
    client: reqwest::Client,
}

impl HttpSpeechSynthesizer {
    pub fn new(config: TtsServiceConfig) -> std::result::Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                PipelineError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// Check if the TTS service is reachable
    pub async fn is_available(&self) -> bool {
        let health_url = format!("{}/health", self.config.url);
        self.client
            .get(&health_url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedSpeech> {
        let url = format!("{}/synthesize", self.config.url);
        let request = SynthesizeRequest {
            text,
            voice: &self.config.voice,
            sample_rate: self.config.output_spec.sample_rate,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("Synthesis request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Synthesis(format!(
                "Synthesis endpoint returned {}",
                response.status()
            )));
        }

        let pcm = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(format!("Failed to read synthesis body: {}", e)))?
            .to_vec();

        if pcm.is_empty() {
            return Err(Error::Synthesis("Service produced no audio".to_string()));
        }

        Ok(SynthesizedSpeech {
            pcm,
            spec: self.config.output_spec,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.voice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = TtsServiceConfig::default();
        assert_eq!(config.url, "http://127.0.0.1:8091");
        assert_eq!(config.output_spec.sample_rate, 16_000);
    }
}
