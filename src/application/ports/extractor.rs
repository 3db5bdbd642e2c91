use async_trait::async_trait;

use crate::domain::{FieldMap, Schema};

/// Schema-driven field extraction against a pluggable, potentially slow,
/// potentially unavailable inference backend.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// For every key in `schema` the returned map contains a corresponding
    /// key; a value the backend could not find is an explicit JSON `null`.
    /// An absent key is an engine bug, so adapters normalize their backend's
    /// output before returning it.
    async fn extract(
        &self,
        document_text: &str,
        schema: &Schema,
    ) -> Result<FieldMap, ExtractorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractorError {
    #[error("extraction backend did not respond within the deadline")]
    Timeout,
    #[error("extraction backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("malformed schema: {0}")]
    MalformedSchema(String),
}

impl ExtractorError {
    /// Timeouts and transport failures are worth another attempt; a
    /// malformed schema will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExtractorError::Timeout | ExtractorError::BackendUnavailable(_)
        )
    }
}
