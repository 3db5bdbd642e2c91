use std::time::Duration;

use async_trait::async_trait;

use crate::domain::JobId;

/// Ordered, at-least-once delivery channel from submitters to workers.
///
/// A leased id is invisible to other `lease` calls until the visibility
/// timeout elapses or the holder acks/nacks it. Lease expiry is the sole
/// crash-recovery mechanism: no heartbeats, just a timestamp comparison at
/// lease-check time. FIFO by enqueue time; once retries are involved,
/// ordering is a liveness property (every job is eventually leased), not a
/// strict sequencing guarantee.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job_id: JobId) -> Result<(), QueueError>;

    /// At most one job id per call; `None` when nothing is leasable.
    async fn lease(
        &self,
        worker_id: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<JobId>, QueueError>;

    /// Permanently remove the entry. Acking an id that is no longer queued
    /// is a no-op, so a worker that lost a commit race may still ack safely.
    async fn ack(&self, job_id: JobId) -> Result<(), QueueError>;

    /// Make the entry immediately visible again, reordered to the current
    /// time rather than its original position.
    async fn nack(&self, job_id: JobId) -> Result<(), QueueError>;
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue backend: {0}")]
    Backend(String),
}
