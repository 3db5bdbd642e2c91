use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use docflow::application::ports::{
    Extractor, ExtractorError, JobQueue, JobStore, RecordSync, SyncError,
};
use docflow::application::services::{SubmissionService, WorkerConfig, WorkerPool};
use docflow::domain::{FieldMap, Job, JobId, JobStatus, Schema, TransitionOutcome};
use docflow::infrastructure::persistence::{InMemoryJobQueue, InMemoryJobStore};

const MAX_ATTEMPTS: u32 = 3;

fn po_schema() -> Schema {
    let mut schema = Schema::new();
    schema.insert("vendor".to_string(), json!("extract vendor"));
    schema.insert("total".to_string(), json!("extract total"));
    schema
}

fn po_fields() -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert("vendor".to_string(), json!("Acme"));
    fields.insert("total".to_string(), json!("$500"));
    fields
}

/// Deterministic extraction stub for the happy path.
struct StubExtractor;

#[async_trait]
impl Extractor for StubExtractor {
    async fn extract(&self, _text: &str, _schema: &Schema) -> Result<FieldMap, ExtractorError> {
        Ok(po_fields())
    }
}

/// Fails with a retryable error a fixed number of times, then succeeds.
struct FlakyExtractor {
    failures_remaining: AtomicU32,
}

#[async_trait]
impl Extractor for FlakyExtractor {
    async fn extract(&self, _text: &str, _schema: &Schema) -> Result<FieldMap, ExtractorError> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(ExtractorError::BackendUnavailable(
                "connection refused".to_string(),
            ));
        }
        Ok(po_fields())
    }
}

struct TimeoutExtractor;

#[async_trait]
impl Extractor for TimeoutExtractor {
    async fn extract(&self, _text: &str, _schema: &Schema) -> Result<FieldMap, ExtractorError> {
        Err(ExtractorError::Timeout)
    }
}

struct MalformedSchemaExtractor;

#[async_trait]
impl Extractor for MalformedSchemaExtractor {
    async fn extract(&self, _text: &str, _schema: &Schema) -> Result<FieldMap, ExtractorError> {
        Err(ExtractorError::MalformedSchema(
            "instructions must be strings".to_string(),
        ))
    }
}

struct CountingSync {
    writes: AtomicUsize,
    errors: Mutex<Vec<(String, String)>>,
}

impl CountingSync {
    fn new() -> Self {
        Self {
            writes: AtomicUsize::new(0),
            errors: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RecordSync for CountingSync {
    async fn write(&self, _record_id: &str, _fields: &FieldMap) -> Result<(), SyncError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn write_error(&self, record_id: &str, message: &str) -> Result<(), SyncError> {
        self.errors
            .lock()
            .unwrap()
            .push((record_id.to_string(), message.to_string()));
        Ok(())
    }
}

struct FailingSync;

#[async_trait]
impl RecordSync for FailingSync {
    async fn write(&self, _record_id: &str, _fields: &FieldMap) -> Result<(), SyncError> {
        Err(SyncError::Rejected {
            status: 500,
            body: "upstream exploded".to_string(),
        })
    }
}

struct Pipeline {
    store: Arc<InMemoryJobStore>,
    queue: Arc<InMemoryJobQueue>,
    submission: SubmissionService,
    pool: WorkerPool,
}

fn pipeline(extractor: Arc<dyn Extractor>, record_sync: Arc<dyn RecordSync>) -> Pipeline {
    let store = Arc::new(InMemoryJobStore::new());
    let queue = Arc::new(InMemoryJobQueue::new());
    let config = WorkerConfig {
        max_attempts: MAX_ATTEMPTS,
        visibility_timeout: Duration::from_secs(60),
        poll_interval: Duration::from_millis(10),
        extract_timeout: Duration::from_secs(5),
        sync_timeout: Duration::from_secs(5),
    };
    let pool = WorkerPool::new(
        store.clone() as Arc<dyn JobStore>,
        queue.clone() as Arc<dyn JobQueue>,
        extractor,
        record_sync,
        config,
    );
    let submission = SubmissionService::new(
        store.clone() as Arc<dyn JobStore>,
        queue.clone() as Arc<dyn JobQueue>,
    );
    Pipeline {
        store,
        queue,
        submission,
        pool,
    }
}

async fn wait_terminal(store: &InMemoryJobStore, id: JobId) -> Job {
    for _ in 0..500 {
        let job = store.get(id).await.unwrap();
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job never reached a terminal status");
}

#[tokio::test]
async fn given_deterministic_extractor_when_processed_then_completed_with_result() {
    let sync = Arc::new(CountingSync::new());
    let p = pipeline(Arc::new(StubExtractor), sync.clone());
    let handle = p.pool.spawn(2);

    let job = p
        .submission
        .submit(
            "PO-1".to_string(),
            "Vendor: Acme. Total: $500.".to_string(),
            po_schema(),
        )
        .await
        .unwrap();

    let done = wait_terminal(&p.store, job.id).await;
    handle.shutdown().await;

    assert_eq!(done.status, JobStatus::Completed);
    let result = done.result.unwrap();
    assert_eq!(result["vendor"], json!("Acme"));
    assert_eq!(result["total"], json!("$500"));
    assert!(done.error.is_none());
    assert_eq!(done.attempt_count, 1);
    assert_eq!(sync.writes.load(Ordering::SeqCst), 1);

    // The queue entry is gone: nothing left to lease.
    let leased = p.queue.lease("probe", Duration::from_secs(1)).await.unwrap();
    assert!(leased.is_none());
}

#[tokio::test]
async fn given_extractor_that_always_times_out_when_processed_then_failed_after_max_attempts() {
    let p = pipeline(Arc::new(TimeoutExtractor), Arc::new(CountingSync::new()));
    let handle = p.pool.spawn(1);

    let job = p
        .submission
        .submit("PO-2".to_string(), "Vendor: Acme.".to_string(), po_schema())
        .await
        .unwrap();

    let done = wait_terminal(&p.store, job.id).await;
    handle.shutdown().await;

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.attempt_count, MAX_ATTEMPTS);
    let error = done.error.unwrap();
    assert_eq!(error.kind.as_str(), "extraction_timeout");
    assert!(done.result.is_none());
}

#[tokio::test]
async fn given_one_failure_short_of_limit_when_processed_then_completed() {
    let extractor = Arc::new(FlakyExtractor {
        failures_remaining: AtomicU32::new(MAX_ATTEMPTS - 1),
    });
    let p = pipeline(extractor, Arc::new(CountingSync::new()));
    let handle = p.pool.spawn(1);

    let job = p
        .submission
        .submit("PO-3".to_string(), "Vendor: Acme.".to_string(), po_schema())
        .await
        .unwrap();

    let done = wait_terminal(&p.store, job.id).await;
    handle.shutdown().await;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.attempt_count, MAX_ATTEMPTS);
}

#[tokio::test]
async fn given_failing_sync_when_extraction_succeeds_then_failed_with_sync_kind() {
    let p = pipeline(Arc::new(StubExtractor), Arc::new(FailingSync));
    let handle = p.pool.spawn(1);

    let job = p
        .submission
        .submit("PO-4".to_string(), "Vendor: Acme.".to_string(), po_schema())
        .await
        .unwrap();

    let done = wait_terminal(&p.store, job.id).await;
    handle.shutdown().await;

    assert_eq!(done.status, JobStatus::Failed);
    let error = done.error.unwrap();
    assert_eq!(error.kind.as_str(), "sync_failed");
    // Extraction succeeded but was never persisted; the result is not
    // stored on a failed job.
    assert!(done.result.is_none());
    // Sync is never retried: one attempt, no requeue.
    assert_eq!(done.attempt_count, 1);
}

#[tokio::test]
async fn given_malformed_schema_when_processed_then_failed_without_retry() {
    let p = pipeline(Arc::new(MalformedSchemaExtractor), Arc::new(CountingSync::new()));
    let handle = p.pool.spawn(1);

    let job = p
        .submission
        .submit("PO-5".to_string(), "Vendor: Acme.".to_string(), po_schema())
        .await
        .unwrap();

    let done = wait_terminal(&p.store, job.id).await;
    handle.shutdown().await;

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.attempt_count, 1);
    assert_eq!(done.error.unwrap().kind.as_str(), "malformed_schema");
}

#[tokio::test]
async fn given_lease_without_claim_when_nacked_then_attempts_unchanged_and_releasable() {
    // No workers running; drive the queue by hand.
    let p = pipeline(Arc::new(StubExtractor), Arc::new(CountingSync::new()));

    let job = p
        .submission
        .submit("PO-6".to_string(), "Vendor: Acme.".to_string(), po_schema())
        .await
        .unwrap();

    let leased = p.queue.lease("w0", Duration::from_secs(60)).await.unwrap();
    assert_eq!(leased, Some(job.id));

    p.queue.nack(job.id).await.unwrap();

    // Only an actual extraction attempt increments the counter.
    let fetched = p.store.get(job.id).await.unwrap();
    assert_eq!(fetched.attempt_count, 0);
    assert_eq!(fetched.status, JobStatus::Queued);

    let leased = p.queue.lease("w1", Duration::from_secs(60)).await.unwrap();
    assert_eq!(leased, Some(job.id));
}

#[tokio::test]
async fn given_permanent_failure_when_committed_then_error_reported_to_record_system() {
    let sync = Arc::new(CountingSync::new());
    let p = pipeline(Arc::new(MalformedSchemaExtractor), sync.clone());
    let handle = p.pool.spawn(1);

    let job = p
        .submission
        .submit("PO-7".to_string(), "Vendor: Acme.".to_string(), po_schema())
        .await
        .unwrap();

    let done = wait_terminal(&p.store, job.id).await;
    handle.shutdown().await;

    assert_eq!(done.status, JobStatus::Failed);
    // The external record carries the same failure the store holds.
    let errors = sync.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "PO-7");
    assert!(errors[0].1.contains("instructions must be strings"));
}

#[tokio::test(start_paused = true)]
async fn given_stale_processing_job_when_lease_expires_then_another_worker_takes_over() {
    let sync = Arc::new(CountingSync::new());
    let p = pipeline(Arc::new(StubExtractor), sync.clone());

    let job = p
        .submission
        .submit(
            "PO-8".to_string(),
            "Vendor: Acme. Total: $500.".to_string(),
            po_schema(),
        )
        .await
        .unwrap();

    // A worker leases and claims the job, then dies before committing: the
    // status stays PROCESSING while the queue lease runs down.
    let leased = p
        .queue
        .lease("dead-worker", Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(leased, Some(job.id));
    p.store
        .transition(
            job.id,
            JobStatus::Queued,
            JobStatus::Processing,
            TransitionOutcome::None,
        )
        .await
        .unwrap();
    p.store.increment_attempt(job.id).await.unwrap();

    tokio::time::advance(Duration::from_secs(61)).await;

    let handle = p.pool.spawn(1);
    let done = wait_terminal(&p.store, job.id).await;
    handle.shutdown().await;

    // Exactly one terminal commit: the takeover proceeds on the stale
    // PROCESSING row without a second claim transition.
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.attempt_count, 2);
    assert_eq!(sync.writes.load(Ordering::SeqCst), 1);

    let leased = p.queue.lease("probe", Duration::from_secs(1)).await.unwrap();
    assert!(leased.is_none());
}

#[tokio::test(start_paused = true)]
async fn given_terminal_job_with_lingering_queue_entry_when_leased_then_dropped() {
    let sync = Arc::new(CountingSync::new());
    let p = pipeline(Arc::new(StubExtractor), sync.clone());

    let job = p
        .submission
        .submit(
            "PO-9".to_string(),
            "Vendor: Acme. Total: $500.".to_string(),
            po_schema(),
        )
        .await
        .unwrap();

    // Finish the job out of band; its queue entry lingers.
    p.store
        .transition(
            job.id,
            JobStatus::Queued,
            JobStatus::Processing,
            TransitionOutcome::None,
        )
        .await
        .unwrap();
    p.store
        .transition(
            job.id,
            JobStatus::Processing,
            JobStatus::Completed,
            TransitionOutcome::Result(po_fields()),
        )
        .await
        .unwrap();

    let handle = p.pool.spawn(1);
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.shutdown().await;

    // The worker acked the stale entry without touching the job.
    let fetched = p.store.get(job.id).await.unwrap();
    assert_eq!(fetched.status, JobStatus::Completed);
    assert_eq!(fetched.attempt_count, 0);
    assert_eq!(sync.writes.load(Ordering::SeqCst), 0);

    let leased = p.queue.lease("probe", Duration::from_secs(1)).await.unwrap();
    assert!(leased.is_none());
}

#[tokio::test]
async fn given_many_jobs_and_small_pool_when_processed_then_every_job_completes() {
    let sync = Arc::new(CountingSync::new());
    let p = pipeline(Arc::new(StubExtractor), sync.clone());
    let handle = p.pool.spawn(3);

    let mut ids = Vec::new();
    for i in 0..20 {
        let job = p
            .submission
            .submit(
                format!("PO-{i}"),
                "Vendor: Acme. Total: $500.".to_string(),
                po_schema(),
            )
            .await
            .unwrap();
        ids.push(job.id);
    }

    for id in ids {
        let done = wait_terminal(&p.store, id).await;
        assert_eq!(done.status, JobStatus::Completed);
    }
    handle.shutdown().await;

    assert_eq!(sync.writes.load(Ordering::SeqCst), 20);
}
