//! Turn records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed conversational turn
///
/// Produced once per turn and handed to the turn logger; never retained
/// by the core beyond the call that produces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Recognized user speech
    pub transcript: String,
    /// Generated reply text
    pub response_text: String,
    /// When the utterance entered the pipeline
    pub started_at: DateTime<Utc>,
    /// When synthesis finished
    pub completed_at: DateTime<Utc>,
}

impl TurnRecord {
    pub fn new(
        transcript: impl Into<String>,
        response_text: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            transcript: transcript.into(),
            response_text: response_text.into(),
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Wall-clock duration of the turn in milliseconds
    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}
