//! HTTP wake/ASR backend
//!
//! Talks to an external speech service that owns the acoustic model.
//! Wake detection is stateful on the service side per session; this
//! adapter mirrors the stream lifecycle locally so resets between turns
//! can be verified and stale sessions detected without a network trip.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;

use voicelink_core::{Error, Result, SpeechRecognizer, Utterance};

use crate::PipelineError;

/// Wake/ASR service configuration
#[derive(Debug, Clone)]
pub struct SttServiceConfig {
    /// Base URL of the speech service
    pub url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Model identifier reported for logging
    pub model: String,
}

impl Default for SttServiceConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8090".to_string(),
            timeout: Duration::from_secs(30),
            model: "sense-voice".to_string(),
        }
    }
}

/// Per-session wake stream bookkeeping
#[derive(Debug, Default)]
struct WakeStream {
    chunks_seen: u64,
    wake_confirmed: bool,
}

/// Response from the speech service's wake endpoint
#[derive(Debug, Deserialize)]
struct WakeResponse {
    wake_confirmed: bool,
}

/// Response from the speech service's transcription endpoint
#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP wake/ASR backend
pub struct HttpSpeechRecognizer {
    config: SttServiceConfig,
    client: reqwest::Client,
    streams: Mutex<HashMap<String, WakeStream>>,
}

impl HttpSpeechRecognizer {
    pub fn new(config: SttServiceConfig) -> std::result::Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                PipelineError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            config,
            client,
            streams: Mutex::new(HashMap::new()),
        })
    }

    /// Check if the speech service is reachable
    pub async fn is_available(&self) -> bool {
        let health_url = format!("{}/health", self.config.url);
        self.client
            .get(&health_url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn ensure_stream(&self, session_id: &str) -> Result<()> {
        if !self.streams.lock().contains_key(session_id) {
            return Err(Error::Recognition(format!(
                "No wake stream for session {}",
                session_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SpeechRecognizer for HttpSpeechRecognizer {
    async fn create_stream(&self, session_id: &str) -> Result<()> {
        self.streams
            .lock()
            .insert(session_id.to_string(), WakeStream::default());
        tracing::debug!(session_id = %session_id, "Created wake stream");
        Ok(())
    }

    async fn process_chunk(&self, session_id: &str, pcm: &[u8]) -> Result<bool> {
        self.ensure_stream(session_id)?;

        let url = format!("{}/wake", self.config.url);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "audio/pcm")
            .header("X-Session-Id", session_id)
            .body(pcm.to_vec())
            .send()
            .await
            .map_err(|e| Error::Recognition(format!("Wake request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Recognition(format!(
                "Wake endpoint returned {}",
                response.status()
            )));
        }

        let wake: WakeResponse = response
            .json()
            .await
            .map_err(|e| Error::Recognition(format!("Bad wake response: {}", e)))?;

        let mut streams = self.streams.lock();
        if let Some(stream) = streams.get_mut(session_id) {
            stream.chunks_seen += 1;
            stream.wake_confirmed = wake.wake_confirmed;
        }

        Ok(wake.wake_confirmed)
    }

    async fn transcribe(&self, utterance: &Utterance) -> Result<String> {
        let spec = utterance.spec();
        let url = format!("{}/transcribe", self.config.url);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "audio/pcm")
            .header("X-Sample-Rate", spec.sample_rate.to_string())
            .body(utterance.pcm().to_vec())
            .send()
            .await
            .map_err(|e| Error::Recognition(format!("Transcribe request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Recognition(format!(
                "Transcribe endpoint returned {}",
                response.status()
            )));
        }

        let result: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| Error::Recognition(format!("Bad transcribe response: {}", e)))?;

        if let Some(error) = result.error {
            return Err(Error::Recognition(error));
        }

        Ok(result.text)
    }

    async fn reset_stream(&self, session_id: &str) -> Result<()> {
        {
            let mut streams = self.streams.lock();
            if let Some(stream) = streams.get_mut(session_id) {
                *stream = WakeStream::default();
            }
        }

        // Clear service-side detector buffers too
        let url = format!("{}/stream/reset", self.config.url);
        let response = self
            .client
            .post(&url)
            .header("X-Session-Id", session_id)
            .send()
            .await
            .map_err(|e| Error::Recognition(format!("Stream reset failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Recognition(format!(
                "Stream reset returned {}",
                response.status()
            )));
        }

        tracing::debug!(session_id = %session_id, "Reset wake stream");
        Ok(())
    }

    async fn destroy_stream(&self, session_id: &str) -> Result<()> {
        let removed = self.streams.lock().remove(session_id);
        if let Some(stream) = removed {
            tracing::debug!(
                session_id = %session_id,
                chunks_seen = stream.chunks_seen,
                "Destroyed wake stream"
            );
        }

        let url = format!("{}/stream/destroy", self.config.url);
        // Best effort: the session is going away regardless
        if let Err(e) = self
            .client
            .post(&url)
            .header("X-Session-Id", session_id)
            .send()
            .await
        {
            tracing::warn!(session_id = %session_id, error = %e, "Stream teardown request failed");
        }

        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SttServiceConfig::default();
        assert_eq!(config.url, "http://127.0.0.1:8090");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_process_chunk_requires_stream() {
        let recognizer = HttpSpeechRecognizer::new(SttServiceConfig::default()).unwrap();
        let err = recognizer.process_chunk("nope", &[0; 4]).await.unwrap_err();
        assert!(matches!(err, Error::Recognition(_)));
    }

    #[tokio::test]
    async fn test_stream_lifecycle_bookkeeping() {
        let recognizer = HttpSpeechRecognizer::new(SttServiceConfig::default()).unwrap();
        recognizer.create_stream("s1").await.unwrap();
        assert!(recognizer.streams.lock().contains_key("s1"));

        recognizer.destroy_stream("s1").await.unwrap();
        assert!(!recognizer.streams.lock().contains_key("s1"));
    }
}
