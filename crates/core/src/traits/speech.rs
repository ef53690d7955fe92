//! Speech processing traits

use async_trait::async_trait;

use crate::{Result, SynthesizedSpeech, Utterance};

/// Combined wake-word spotting and speech-to-text interface
///
/// The engine keeps per-session streaming state for wake detection
/// (rolling buffers, silence counters). Sessions must create their stream
/// before feeding chunks, reset it between turns so stale detector state
/// never leaks into the next turn, and destroy it when the connection
/// closes.
///
/// # Example
///
/// ```ignore
/// let engine: Arc<dyn SpeechRecognizer> = Arc::new(HttpSpeechRecognizer::new(config)?);
/// engine.create_stream(&session_id).await?;
/// if engine.process_chunk(&session_id, &chunk).await? {
///     // wake phrase confirmed, begin full-utterance capture
/// }
/// ```
#[async_trait]
pub trait SpeechRecognizer: Send + Sync + 'static {
    /// Allocate per-session wake-detection state
    async fn create_stream(&self, session_id: &str) -> Result<()>;

    /// Feed one PCM chunk to the wake detector
    ///
    /// # Returns
    /// `true` once the wake phrase has been confirmed for this stream
    async fn process_chunk(&self, session_id: &str, pcm: &[u8]) -> Result<bool>;

    /// Transcribe a finalized utterance
    ///
    /// An empty transcript is reported as an error by the caller; the
    /// engine itself returns whatever the model produced.
    async fn transcribe(&self, utterance: &Utterance) -> Result<String>;

    /// Clear per-session detector state between turns
    async fn reset_stream(&self, session_id: &str) -> Result<()>;

    /// Tear down per-session state when the connection closes
    async fn destroy_stream(&self, session_id: &str) -> Result<()>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}

/// Text-to-speech interface
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync + 'static {
    /// Synthesize reply text into PCM audio
    async fn synthesize(&self, text: &str) -> Result<SynthesizedSpeech>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}
