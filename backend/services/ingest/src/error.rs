use crmsync_common::error::CrmsyncError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("record {record_id} skipped: {reason}")]
    Transform { record_id: String, reason: String },

    #[error("action sink write failed: {0}")]
    SinkWrite(String),

    #[error("store error: {0}")]
    Store(#[from] CrmsyncError),

    #[error("batch queue is closed")]
    QueueClosed,
}
