//! Ollama backend

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use voicelink_core::{ResponseGenerator, Result as CoreResult, TextFragmentStream};

use crate::prompt::PromptBuilder;
use crate::LlmError;

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model name/ID
    pub model: String,
    /// API endpoint
    pub endpoint: String,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    /// Temperature
    pub temperature: f32,
    /// Request timeout
    pub timeout: Duration,
    /// Optional system preamble prepended to every prompt
    pub system_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "qwen2.5:latest".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            max_tokens: 256,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
            system_prompt: None,
        }
    }
}

/// Ollama backend
///
/// Streams fragments from `/api/generate`; one call produces one finite,
/// non-restartable fragment stream. Retry policy lives with the caller.
#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    config: LlmConfig,
    prompt: PromptBuilder,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        let prompt = match &config.system_prompt {
            Some(system) => PromptBuilder::new().with_system(system.clone()),
            None => PromptBuilder::new(),
        };

        Ok(Self {
            client,
            config,
            prompt,
        })
    }

    /// Build the API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint, path)
    }

    /// Check if the model endpoint is reachable
    pub async fn is_available(&self) -> bool {
        self.client
            .get(self.api_url("/tags"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn start_stream(&self, transcript: &str) -> Result<TextFragmentStream, LlmError> {
        tracing::debug!(
            model = %self.config.model,
            transcript_chars = transcript.len(),
            "Starting generation stream"
        );

        let request = OllamaGenerateRequest {
            model: self.config.model.clone(),
            prompt: self.prompt.build(transcript),
            stream: true,
            options: Some(OllamaOptions {
                temperature: Some(self.config.temperature),
                num_predict: Some(self.config.max_tokens as i32),
            }),
        };

        let response = self
            .client
            .post(self.api_url("/generate"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{}: {}", status, body)));
        }

        let mut bytes = response.bytes_stream();

        // NDJSON: chunks may split lines, so carry the remainder across reads
        let stream = async_stream::stream! {
            let mut pending = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(LlmError::from(e).into());
                        return;
                    }
                };
                pending.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = pending.find('\n') {
                    let line: String = pending.drain(..=pos).collect();
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match parse_stream_line(line) {
                        Ok(parsed) => {
                            let done = parsed.done;
                            if !parsed.response.is_empty() {
                                yield Ok(parsed.response);
                            }
                            if done {
                                return;
                            }
                        }
                        Err(e) => {
                            yield Err(e.into());
                            return;
                        }
                    }
                }
            }
        };

        let boxed: TextFragmentStream = Box::pin(stream);
        Ok(boxed)
    }
}

#[async_trait]
impl ResponseGenerator for OllamaBackend {
    async fn generate(&self, prompt: &str) -> CoreResult<TextFragmentStream> {
        let stream = self.start_stream(prompt).await?;
        Ok(stream)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

fn parse_stream_line(line: &str) -> Result<OllamaStreamChunk, LlmError> {
    serde_json::from_str(line)
        .map_err(|e| LlmError::InvalidResponse(format!("Bad stream chunk: {}", e)))
}

// Ollama API types
#[derive(Debug, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = LlmConfig::default();
        assert_eq!(config.endpoint, "http://localhost:11434");
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_parse_stream_line() {
        let chunk = parse_stream_line(r#"{"response":"Hello","done":false}"#).unwrap();
        assert_eq!(chunk.response, "Hello");
        assert!(!chunk.done);

        let last = parse_stream_line(r#"{"response":"","done":true}"#).unwrap();
        assert!(last.response.is_empty());
        assert!(last.done);

        assert!(parse_stream_line("not json").is_err());
    }

    #[test]
    fn test_api_url() {
        let backend = OllamaBackend::new(LlmConfig::default()).unwrap();
        assert_eq!(
            backend.api_url("/generate"),
            "http://localhost:11434/api/generate"
        );
    }
}
