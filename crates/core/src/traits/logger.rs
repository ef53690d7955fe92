//! Turn history trait

use async_trait::async_trait;

use crate::{Result, TurnRecord};

/// Append-only turn history sink
#[async_trait]
pub trait TurnLogger: Send + Sync + 'static {
    /// Persist one completed turn
    async fn append_turn(&self, record: &TurnRecord) -> Result<()>;
}
