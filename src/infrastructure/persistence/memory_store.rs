use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::application::ports::{JobStore, NewJob, StoreError};
use crate::domain::{Job, JobId, JobStatus, TransitionOutcome};

/// In-memory job store behind a single mutex. The default wiring for a
/// single-process deployment and the substrate for tests; the Postgres
/// store is the durable alternative behind the same port.
pub struct InMemoryJobStore {
    inner: Mutex<Inner>,
}

struct Inner {
    jobs: HashMap<JobId, Job>,
    // Creation order, so `list` can page newest-first without sorting.
    order: Vec<JobId>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                jobs: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let job = Job::new(new_job.record_id, new_job.document_text, new_job.schema);
        let mut inner = self.inner.lock().await;
        inner.order.push(job.id);
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        let inner = self.inner.lock().await;
        inner.jobs.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.lock().await;
        let jobs = inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|job| status.is_none_or(|s| job.status == s))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(jobs)
    }

    async fn transition(
        &self,
        id: JobId,
        expected: JobStatus,
        new: JobStatus,
        outcome: TransitionOutcome,
    ) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock().await;
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if job.status != expected || job.status.is_terminal() {
            return Err(StoreError::Conflict {
                expected,
                actual: job.status,
            });
        }

        match (new, outcome) {
            (JobStatus::Completed, TransitionOutcome::Result(fields)) => {
                job.result = Some(fields);
            }
            (JobStatus::Failed, TransitionOutcome::Error(error)) => {
                job.error = Some(error);
            }
            (s, TransitionOutcome::None) if !s.is_terminal() => {}
            (s, _) => {
                return Err(StoreError::Backend(format!(
                    "invalid outcome payload for transition to {}",
                    s
                )));
            }
        }

        job.status = new;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn increment_attempt(&self, id: JobId) -> Result<u32, StoreError> {
        let mut inner = self.inner.lock().await;
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.attempt_count += 1;
        Ok(job.attempt_count)
    }
}
