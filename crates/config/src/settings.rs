//! Main settings module

use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Captured-audio format and limits
    #[serde(default)]
    pub audio: AudioConfig,

    /// Wire protocol limits and timeouts
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Reply generation backend
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Wake/ASR and TTS backends
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Directory receiving one flat file per completed turn
    #[serde(default = "default_history_dir")]
    pub history_dir: String,
}

fn default_history_dir() -> String {
    "dialogue_history".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            audio: AudioConfig::default(),
            protocol: ProtocolConfig::default(),
            generation: GenerationConfig::default(),
            speech: SpeechConfig::default(),
            observability: ObservabilityConfig::default(),
            history_dir: default_history_dir(),
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Whole-connection idle timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_sessions() -> usize {
    64
}

fn default_idle_timeout_secs() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_sessions: default_max_sessions(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Captured-audio format and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Samples per second
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Channel count
    #[serde(default = "default_channels")]
    pub channels: u16,

    /// Bytes per sample (2 = 16-bit PCM)
    #[serde(default = "default_sample_width")]
    pub sample_width: u16,

    /// Minimum utterance duration in seconds
    #[serde(default = "default_min_utterance_secs")]
    pub min_utterance_secs: f64,

    /// Full-utterance capture timeout in seconds
    #[serde(default = "default_capture_timeout_secs")]
    pub capture_timeout_secs: u64,

    /// Scratch directory for per-session WAV artifacts
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_channels() -> u16 {
    1
}

fn default_sample_width() -> u16 {
    2
}

fn default_min_utterance_secs() -> f64 {
    1.0
}

fn default_capture_timeout_secs() -> u64 {
    30
}

fn default_scratch_dir() -> String {
    "temp_audio".to_string()
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            sample_width: default_sample_width(),
            min_utterance_secs: default_min_utterance_secs(),
            capture_timeout_secs: default_capture_timeout_secs(),
            scratch_dir: default_scratch_dir(),
        }
    }
}

impl AudioConfig {
    pub fn min_utterance_duration(&self) -> Duration {
        Duration::from_secs_f64(self.min_utterance_secs)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }
}

/// Wire protocol limits and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Maximum payload bytes per frame
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Outgoing payload split size
    #[serde(default = "default_send_chunk_bytes")]
    pub send_chunk_bytes: usize,

    /// Frame header receive timeout in seconds
    #[serde(default = "default_header_timeout_secs")]
    pub header_timeout_secs: u64,
}

fn default_max_frame_bytes() -> usize {
    4096
}

fn default_send_chunk_bytes() -> usize {
    2048
}

fn default_header_timeout_secs() -> u64 {
    5
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
            send_chunk_bytes: default_send_chunk_bytes(),
            header_timeout_secs: default_header_timeout_secs(),
        }
    }
}

impl ProtocolConfig {
    pub fn header_timeout(&self) -> Duration {
        Duration::from_secs(self.header_timeout_secs)
    }
}

/// Reply generation backend (Ollama)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model name
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// API endpoint
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,

    /// Maximum tokens per reply
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout in seconds
    #[serde(default = "default_generation_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Total generation attempts per turn
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed backoff between attempts in seconds
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,

    /// Canned reply substituted when every attempt fails
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,

    /// Optional system preamble prepended to every prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_generation_model() -> String {
    "qwen2.5:latest".to_string()
}

fn default_generation_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_max_tokens() -> usize {
    256
}

fn default_temperature() -> f32 {
    0.7
}

fn default_generation_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_secs() -> u64 {
    2
}

fn default_fallback_reply() -> String {
    "Sorry, I can't handle that request right now.".to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            endpoint: default_generation_endpoint(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_generation_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_backoff_secs: default_retry_backoff_secs(),
            fallback_reply: default_fallback_reply(),
            system_prompt: None,
        }
    }
}

impl GenerationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

/// Wake/ASR and TTS backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Wake/ASR service base URL
    #[serde(default = "default_stt_endpoint")]
    pub stt_endpoint: String,

    /// TTS service base URL
    #[serde(default = "default_tts_endpoint")]
    pub tts_endpoint: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_speech_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Concurrent inference permits shared across sessions
    ///
    /// 1 serializes access for backends that are not concurrency-safe.
    #[serde(default = "default_max_concurrent_inferences")]
    pub max_concurrent_inferences: usize,
}

fn default_stt_endpoint() -> String {
    "http://127.0.0.1:8090".to_string()
}

fn default_tts_endpoint() -> String {
    "http://127.0.0.1:8091".to_string()
}

fn default_speech_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_inferences() -> usize {
    1
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt_endpoint: default_stt_endpoint(),
            tts_endpoint: default_tts_endpoint(),
            request_timeout_secs: default_speech_timeout_secs(),
            max_concurrent_inferences: default_max_concurrent_inferences(),
        }
    }
}

impl SpeechConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted logs
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_audio()?;
        self.validate_protocol()?;
        self.validate_generation()?;

        if self.server.idle_timeout_secs < self.audio.capture_timeout_secs {
            tracing::warn!(
                idle = self.server.idle_timeout_secs,
                capture = self.audio.capture_timeout_secs,
                "Idle timeout is shorter than the capture timeout; captures may be cut off"
            );
        }

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }
        if self.server.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_sessions".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }
        if self.server.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.idle_timeout_secs".to_string(),
                message: "Must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    fn validate_audio(&self) -> Result<(), ConfigError> {
        if self.audio.sample_rate == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audio.sample_rate".to_string(),
                message: "Sample rate cannot be 0".to_string(),
            });
        }
        if self.audio.channels == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audio.channels".to_string(),
                message: "Channel count cannot be 0".to_string(),
            });
        }
        if !(1..=4).contains(&self.audio.sample_width) {
            return Err(ConfigError::InvalidValue {
                field: "audio.sample_width".to_string(),
                message: format!("Must be 1-4 bytes, got {}", self.audio.sample_width),
            });
        }
        if self.audio.min_utterance_secs <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "audio.min_utterance_secs".to_string(),
                message: "Must be positive".to_string(),
            });
        }
        if self.audio.capture_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audio.capture_timeout_secs".to_string(),
                message: "Must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    fn validate_protocol(&self) -> Result<(), ConfigError> {
        // 0xFFFF is the end-of-message sentinel and can never be a payload length
        if self.protocol.max_frame_bytes == 0 || self.protocol.max_frame_bytes >= 0xFFFF {
            return Err(ConfigError::InvalidValue {
                field: "protocol.max_frame_bytes".to_string(),
                message: format!(
                    "Must be between 1 and 65534, got {}",
                    self.protocol.max_frame_bytes
                ),
            });
        }
        if self.protocol.send_chunk_bytes == 0
            || self.protocol.send_chunk_bytes > self.protocol.max_frame_bytes
        {
            return Err(ConfigError::InvalidValue {
                field: "protocol.send_chunk_bytes".to_string(),
                message: format!(
                    "Must be between 1 and max_frame_bytes ({})",
                    self.protocol.max_frame_bytes
                ),
            });
        }
        if self.protocol.header_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "protocol.header_timeout_secs".to_string(),
                message: "Must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    fn validate_generation(&self) -> Result<(), ConfigError> {
        if self.generation.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "generation.max_attempts".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }
        if self.generation.fallback_reply.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "generation.fallback_reply".to_string(),
                message: "Cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Load settings from files and the environment
///
/// Priority: env vars > config/{env} > config/default > built-in defaults.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICELINK")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.audio.sample_rate, 16_000);
        assert_eq!(settings.protocol.max_frame_bytes, 4096);
        assert_eq!(settings.generation.max_attempts, 3);
        assert_eq!(settings.history_dir, "dialogue_history");
        settings.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_zero_port() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "server.port"
        ));
    }

    #[test]
    fn test_validation_rejects_sentinel_frame_size() {
        let mut settings = Settings::default();
        settings.protocol.max_frame_bytes = 0xFFFF;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_oversized_send_chunk() {
        let mut settings = Settings::default();
        settings.protocol.send_chunk_bytes = settings.protocol.max_frame_bytes + 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_duration_accessors() {
        let settings = Settings::default();
        assert_eq!(settings.server.idle_timeout(), Duration::from_secs(300));
        assert_eq!(settings.protocol.header_timeout(), Duration::from_secs(5));
        assert_eq!(settings.audio.capture_timeout(), Duration::from_secs(30));
        assert_eq!(
            settings.audio.min_utterance_duration(),
            Duration::from_secs(1)
        );
    }
}
