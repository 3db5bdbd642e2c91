use async_trait::async_trait;

use crate::domain::{Job, JobId, JobStatus, Schema, TransitionOutcome};

/// Fields needed to create a job; the store assigns id, status and
/// timestamps.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub record_id: String,
    pub document_text: String,
    pub schema: Schema,
}

/// Authoritative persistence for job records. The single source of truth
/// for queue depth and job history; workers hold a transient queue lease
/// but never the only copy of the data.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job with status `QUEUED` and `attempt_count = 0`.
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError>;

    async fn get(&self, id: JobId) -> Result<Job, StoreError>;

    /// Page of jobs, newest first, optionally filtered by status.
    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>, StoreError>;

    /// Atomic compare-and-swap on `status`. When two workers race on the
    /// same job, exactly one call succeeds; the loser gets
    /// [`StoreError::Conflict`] and must treat the job as already handled,
    /// never retrying the same transition. Every successful transition
    /// advances `updated_at`. The outcome payload is only legal on
    /// transitions into a terminal status.
    async fn transition(
        &self,
        id: JobId,
        expected: JobStatus,
        new: JobStatus,
        outcome: TransitionOutcome,
    ) -> Result<Job, StoreError>;

    /// Bump `attempt_count` by one and return the new value. The only
    /// mutation a worker performs without a full status transition.
    async fn increment_attempt(&self, id: JobId) -> Result<u32, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("status conflict: expected {expected}, found {actual}")]
    Conflict {
        expected: JobStatus,
        actual: JobStatus,
    },
    #[error("store backend: {0}")]
    Backend(String),
}
