//! Response generation trait

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::Result;

/// Stream of incremental text fragments from the generator
///
/// Finite and not restartable; a failure mid-stream fails the whole
/// attempt.
pub type TextFragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Reply generation interface
#[async_trait]
pub trait ResponseGenerator: Send + Sync + 'static {
    /// Start generating a reply for `prompt`
    ///
    /// Returns a lazy stream of text fragments; the caller accumulates
    /// fragments until the stream ends.
    async fn generate(&self, prompt: &str) -> Result<TextFragmentStream>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}
