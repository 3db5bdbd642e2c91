use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::application::ports::{JobQueue, QueueError};
use crate::domain::JobId;

/// In-memory FIFO queue with visibility-timeout leasing.
///
/// Uses `tokio::time::Instant` so lease expiry follows the tokio clock and
/// paused-time tests can drive recovery deterministically.
pub struct InMemoryJobQueue {
    entries: Mutex<VecDeque<Entry>>,
}

struct Entry {
    job_id: JobId,
    leased_until: Option<Instant>,
    lease_holder: Option<String>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
        }
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job_id: JobId) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().await;
        entries.push_back(Entry {
            job_id,
            leased_until: None,
            lease_holder: None,
        });
        Ok(())
    }

    async fn lease(
        &self,
        worker_id: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<JobId>, QueueError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        for entry in entries.iter_mut() {
            let leasable = entry.leased_until.is_none_or(|until| until <= now);
            if leasable {
                entry.leased_until = Some(now + visibility_timeout);
                entry.lease_holder = Some(worker_id.to_string());
                return Ok(Some(entry.job_id));
            }
        }
        Ok(None)
    }

    async fn ack(&self, job_id: JobId) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().await;
        entries.retain(|entry| entry.job_id != job_id);
        Ok(())
    }

    async fn nack(&self, job_id: JobId) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().await;
        let pos = entries.iter().position(|entry| entry.job_id == job_id);
        if let Some(mut entry) = pos.and_then(|p| entries.remove(p)) {
            entry.leased_until = None;
            entry.lease_holder = None;
            // Requeued at the current time, not the original position.
            entries.push_back(entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VISIBILITY: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn given_empty_queue_when_leased_then_none() {
        let queue = InMemoryJobQueue::new();
        let leased = queue.lease("worker-0", VISIBILITY).await.unwrap();
        assert!(leased.is_none());
    }

    #[tokio::test]
    async fn given_enqueued_jobs_when_leased_then_fifo_order() {
        let queue = InMemoryJobQueue::new();
        let first = JobId::new();
        let second = JobId::new();
        queue.enqueue(first).await.unwrap();
        queue.enqueue(second).await.unwrap();

        assert_eq!(queue.lease("w0", VISIBILITY).await.unwrap(), Some(first));
        assert_eq!(queue.lease("w1", VISIBILITY).await.unwrap(), Some(second));
        assert_eq!(queue.lease("w2", VISIBILITY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn given_leased_job_when_leased_again_then_invisible() {
        let queue = InMemoryJobQueue::new();
        let job_id = JobId::new();
        queue.enqueue(job_id).await.unwrap();

        assert_eq!(queue.lease("w0", VISIBILITY).await.unwrap(), Some(job_id));
        assert_eq!(queue.lease("w1", VISIBILITY).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn given_expired_lease_when_leased_then_job_recovered() {
        let queue = InMemoryJobQueue::new();
        let job_id = JobId::new();
        queue.enqueue(job_id).await.unwrap();

        assert_eq!(queue.lease("w0", VISIBILITY).await.unwrap(), Some(job_id));

        tokio::time::advance(VISIBILITY + Duration::from_secs(1)).await;

        // The crashed worker never acked; the lease expires and another
        // worker picks the job up.
        assert_eq!(queue.lease("w1", VISIBILITY).await.unwrap(), Some(job_id));
    }

    #[tokio::test]
    async fn given_acked_job_when_leased_then_gone() {
        let queue = InMemoryJobQueue::new();
        let job_id = JobId::new();
        queue.enqueue(job_id).await.unwrap();
        queue.lease("w0", VISIBILITY).await.unwrap();

        queue.ack(job_id).await.unwrap();
        assert_eq!(queue.lease("w1", VISIBILITY).await.unwrap(), None);

        // Acking again is a no-op.
        queue.ack(job_id).await.unwrap();
    }

    #[tokio::test]
    async fn given_nacked_job_when_leased_then_immediately_visible() {
        let queue = InMemoryJobQueue::new();
        let job_id = JobId::new();
        queue.enqueue(job_id).await.unwrap();
        queue.lease("w0", VISIBILITY).await.unwrap();

        queue.nack(job_id).await.unwrap();
        assert_eq!(queue.lease("w1", VISIBILITY).await.unwrap(), Some(job_id));
    }

    #[tokio::test]
    async fn given_nacked_job_when_others_queued_then_moved_behind_them() {
        let queue = InMemoryJobQueue::new();
        let first = JobId::new();
        let second = JobId::new();
        queue.enqueue(first).await.unwrap();
        queue.enqueue(second).await.unwrap();

        queue.lease("w0", VISIBILITY).await.unwrap();
        queue.nack(first).await.unwrap();

        assert_eq!(queue.lease("w1", VISIBILITY).await.unwrap(), Some(second));
        assert_eq!(queue.lease("w2", VISIBILITY).await.unwrap(), Some(first));
    }
}
