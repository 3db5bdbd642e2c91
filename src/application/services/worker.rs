use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use crate::application::ports::{
    Extractor, ExtractorError, JobQueue, JobStore, RecordSync, StoreError, SyncError,
};
use crate::domain::{Job, JobError, JobErrorKind, JobId, JobStatus, TransitionOutcome};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Extraction attempts per job before it fails permanently.
    pub max_attempts: u32,
    /// How long a queue lease stays invisible before an unacked job becomes
    /// re-leasable. Must exceed `extract_timeout + sync_timeout` or a slow
    /// job will be handed to a second worker while the first still runs.
    pub visibility_timeout: Duration,
    /// Idle sleep between lease polls when the queue is empty.
    pub poll_interval: Duration,
    /// Deadline on a single extraction call.
    pub extract_timeout: Duration,
    /// Deadline on a single sync writeback call.
    pub sync_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            visibility_timeout: Duration::from_secs(660),
            poll_interval: Duration::from_millis(500),
            extract_timeout: Duration::from_secs(600),
            sync_timeout: Duration::from_secs(30),
        }
    }
}

/// Fixed-size pool of workers, each running an independent
/// lease -> claim -> extract -> sync -> commit cycle. Workers share no
/// mutable state besides the store and the queue; coordination flows through
/// the store's compare-and-swap transition and the queue's lease/ack/nack.
pub struct WorkerPool {
    job_store: Arc<dyn JobStore>,
    job_queue: Arc<dyn JobQueue>,
    extractor: Arc<dyn Extractor>,
    record_sync: Arc<dyn RecordSync>,
    config: WorkerConfig,
}

pub struct WorkerPoolHandle {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Signal all workers and wait for their in-flight cycles to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

impl WorkerPool {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        job_queue: Arc<dyn JobQueue>,
        extractor: Arc<dyn Extractor>,
        record_sync: Arc<dyn RecordSync>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            job_store,
            job_queue,
            extractor,
            record_sync,
            config,
        }
    }

    /// Spawn `count` workers. Pool size bounds concurrent extraction calls,
    /// protecting a resource-constrained inference backend from overload.
    pub fn spawn(&self, count: usize) -> WorkerPoolHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = (0..count)
            .map(|i| {
                let worker = Worker {
                    id: format!("worker-{}", i),
                    job_store: Arc::clone(&self.job_store),
                    job_queue: Arc::clone(&self.job_queue),
                    extractor: Arc::clone(&self.extractor),
                    record_sync: Arc::clone(&self.record_sync),
                    config: self.config.clone(),
                    shutdown: shutdown_rx.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();
        WorkerPoolHandle {
            shutdown: shutdown_tx,
            handles,
        }
    }
}

struct Worker {
    id: String,
    job_store: Arc<dyn JobStore>,
    job_queue: Arc<dyn JobQueue>,
    extractor: Arc<dyn Extractor>,
    record_sync: Arc<dyn RecordSync>,
    config: WorkerConfig,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        tracing::info!(worker_id = %self.id, "Worker started");
        loop {
            let leased = tokio::select! {
                _ = self.shutdown.changed() => break,
                leased = self.job_queue.lease(&self.id, self.config.visibility_timeout) => leased,
            };

            match leased {
                Ok(Some(job_id)) => {
                    let span = tracing::info_span!(
                        "job",
                        worker_id = %self.id,
                        job_id = %job_id,
                    );
                    self.process(job_id).instrument(span).await;
                }
                Ok(None) => {
                    let idle = tokio::time::sleep(self.config.poll_interval);
                    tokio::select! {
                        _ = self.shutdown.changed() => break,
                        _ = idle => {}
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Lease failed");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
        tracing::info!(worker_id = %self.id, "Worker stopped");
    }

    async fn process(&self, job_id: JobId) {
        let started = Instant::now();

        let Some(job) = self.claim(job_id).await else {
            return;
        };

        let attempt = match self.job_store.increment_attempt(job_id).await {
            Ok(n) => n,
            Err(e) => {
                // Leave the lease to expire; another worker will retry.
                tracing::error!(error = %e, "Failed to record attempt");
                return;
            }
        };

        tracing::debug!(attempt, record_id = %job.record_id, "Extraction attempt");

        let extracted = tokio::time::timeout(
            self.config.extract_timeout,
            self.extractor.extract(&job.document_text, &job.schema),
        )
        .await
        .unwrap_or(Err(ExtractorError::Timeout));

        let committed = match extracted {
            Ok(fields) => {
                let synced = tokio::time::timeout(
                    self.config.sync_timeout,
                    self.record_sync.write(&job.record_id, &fields),
                )
                .await
                .unwrap_or(Err(SyncError::RequestFailed(
                    "writeback did not complete within the deadline".to_string(),
                )));

                match synced {
                    Ok(()) => {
                        self.commit(job_id, JobStatus::Completed, TransitionOutcome::Result(fields))
                            .await
                    }
                    Err(e) => {
                        // Extraction succeeded but was not persisted; surfaced
                        // distinctly so an operator can resubmit. The result is
                        // discarded, never stored on a failed job.
                        tracing::warn!(error = %e, record_id = %job.record_id, "Sync failed");
                        let error = JobError::new(JobErrorKind::SyncFailed, e.to_string());
                        let message = error.message.clone();
                        let committed = self
                            .commit(job_id, JobStatus::Failed, TransitionOutcome::Error(error))
                            .await;
                        if committed {
                            self.report_failure(&job.record_id, &message).await;
                        }
                        committed
                    }
                }
            }
            Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                tracing::warn!(error = %e, attempt, "Extraction failed, requeueing");
                if self
                    .commit(job_id, JobStatus::Queued, TransitionOutcome::None)
                    .await
                {
                    if let Err(e) = self.job_queue.nack(job_id).await {
                        // Requeue lost; lease expiry recovers it.
                        tracing::error!(error = %e, "Nack failed");
                    }
                }
                return;
            }
            Err(e) => {
                let kind = match &e {
                    ExtractorError::Timeout => JobErrorKind::ExtractionTimeout,
                    ExtractorError::BackendUnavailable(_) => JobErrorKind::BackendUnavailable,
                    ExtractorError::MalformedSchema(_) => JobErrorKind::MalformedSchema,
                };
                let message = if e.is_retryable() {
                    format!("retry limit reached after {} attempts: {}", attempt, e)
                } else {
                    e.to_string()
                };
                tracing::warn!(error = %e, attempt, kind = %kind, "Extraction failed permanently");
                let committed = self
                    .commit(
                        job_id,
                        JobStatus::Failed,
                        TransitionOutcome::Error(JobError::new(kind, message.clone())),
                    )
                    .await;
                if committed {
                    self.report_failure(&job.record_id, &message).await;
                }
                committed
            }
        };

        if committed {
            if let Err(e) = self.job_queue.ack(job_id).await {
                tracing::error!(error = %e, "Ack failed");
            }
            tracing::info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                attempt,
                "Job finished"
            );
        }
    }

    /// Surface a permanent failure on the external record. Best-effort: the
    /// store already holds the authoritative error, so a writeback failure
    /// is logged and dropped.
    async fn report_failure(&self, record_id: &str, message: &str) {
        if let Err(e) = self.record_sync.write_error(record_id, message).await {
            tracing::warn!(error = %e, record_id = %record_id, "Error writeback failed");
        }
    }

    /// Claim the job exclusively via compare-and-swap. Returns `None` when
    /// the job must be abandoned.
    async fn claim(&self, job_id: JobId) -> Option<Job> {
        match self
            .job_store
            .transition(
                job_id,
                JobStatus::Queued,
                JobStatus::Processing,
                TransitionOutcome::None,
            )
            .await
        {
            Ok(job) => Some(job),
            Err(StoreError::Conflict { actual, .. }) if actual == JobStatus::Processing => {
                // The record was left PROCESSING by a worker whose lease
                // expired. The queue, not the store status, is the authority
                // on active leasing, and we hold a fresh lease: take over.
                tracing::warn!("Taking over job with stale PROCESSING status");
                match self.job_store.get(job_id).await {
                    Ok(job) => Some(job),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to load job after stale claim");
                        None
                    }
                }
            }
            Err(StoreError::Conflict { actual, .. }) => {
                // Already terminal: a stale queue entry for a finished job.
                tracing::debug!(status = %actual, "Dropping queue entry for terminal job");
                if let Err(e) = self.job_queue.ack(job_id).await {
                    tracing::error!(error = %e, "Ack failed for terminal job");
                }
                None
            }
            Err(StoreError::NotFound(_)) => {
                tracing::warn!("Leased job no longer exists, dropping");
                if let Err(e) = self.job_queue.ack(job_id).await {
                    tracing::error!(error = %e, "Ack failed for missing job");
                }
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "Claim failed");
                None
            }
        }
    }

    /// Commit a terminal (or requeue) transition. A `Conflict` means another
    /// worker already owns the outcome: we lost the lease race, so we must
    /// not also write state. The winner acks; we abandon silently.
    async fn commit(&self, job_id: JobId, new: JobStatus, outcome: TransitionOutcome) -> bool {
        match self
            .job_store
            .transition(job_id, JobStatus::Processing, new, outcome)
            .await
        {
            Ok(_) => true,
            Err(StoreError::Conflict { actual, .. }) => {
                tracing::debug!(status = %actual, "Lost commit race, abandoning stale write");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Commit failed");
                false
            }
        }
    }
}
