use async_trait::async_trait;

use crate::domain::FieldMap;

/// Writeback of extraction results to the external record system.
///
/// Treated as untrusted and possibly slow. Failures here are permanent for
/// the job: sync is never retried automatically (that could double-write
/// side effects on the external system), and the worker converts the error
/// into a clean `FAILED` terminal transition so resubmission is the uniform
/// recovery path.
#[async_trait]
pub trait RecordSync: Send + Sync {
    async fn write(&self, record_id: &str, fields: &FieldMap) -> Result<(), SyncError>;

    /// Report a permanent job failure on the external record, so operators
    /// watching the record system see it without querying the job store.
    /// Best-effort: adapters with no error destination accept and drop it.
    async fn write_error(&self, _record_id: &str, _message: &str) -> Result<(), SyncError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("sync request failed: {0}")]
    RequestFailed(String),
    #[error("sync rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}
