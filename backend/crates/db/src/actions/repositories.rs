use async_trait::async_trait;

use crate::actions::models::ActionEvent;
use crmsync_common::error::CrmsyncResult;

/// The sink for produced action events.
#[async_trait]
pub trait ActionRepository: Send + Sync {
    /// Append a batch of events. Returns the number of rows written.
    async fn append_actions(&self, actions: &[ActionEvent]) -> CrmsyncResult<usize>;
}
