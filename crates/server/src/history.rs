//! Flat-file dialogue history
//!
//! One file per completed turn under the configured history directory.
//! This is the only persistence the server performs.

use std::path::PathBuf;

use async_trait::async_trait;

use voicelink_core::{Error, Result, TurnLogger, TurnRecord};

/// Appends each turn as a timestamped text file
pub struct FileTurnLogger {
    dir: PathBuf,
}

impl FileTurnLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl TurnLogger for FileTurnLogger {
    async fn append_turn(&self, record: &TurnRecord) -> Result<()> {
        let stamp = record.completed_at.format("%Y%m%d_%H%M%S%3f");
        let path = self.dir.join(format!("{}.txt", stamp));

        let body = format!(
            "[{}] User:\n{}\n\n[{}] Assistant:\n{}\n",
            record.started_at.format("%Y-%m-%d %H:%M:%S"),
            record.transcript,
            record.completed_at.format("%Y-%m-%d %H:%M:%S"),
            record.response_text,
        );

        tokio::fs::write(&path, body)
            .await
            .map_err(|e| Error::TurnLog(format!("{}: {}", path.display(), e)))?;

        tracing::debug!(path = %path.display(), "Turn logged");
        Ok(())
    }
}
