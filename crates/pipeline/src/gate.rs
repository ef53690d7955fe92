//! Inference concurrency gate
//!
//! The wake/ASR and synthesizer backends are process-wide resources
//! invoked from every session task. Backends that do not support
//! concurrent invocation are serialized by acquiring a permit here
//! around each call; permit count comes from configuration (1 = fully
//! serialized).

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded permit pool shared across sessions
#[derive(Debug, Clone)]
pub struct InferenceGate {
    semaphore: Arc<Semaphore>,
}

impl InferenceGate {
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    /// Wait for an inference permit
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        // The semaphore lives as long as the gate and is never closed
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("inference gate semaphore closed")
    }
}
