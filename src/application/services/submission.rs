use std::sync::Arc;

use crate::application::ports::{JobQueue, JobStore, NewJob, QueueError, StoreError};
use crate::domain::{Job, JobId, JobStatus, Schema};

/// Boundary the dashboard (and any other caller) uses to enqueue jobs and
/// read status. Validation happens here, before any job record exists, so a
/// rejected submission leaves no trace in the store.
pub struct SubmissionService {
    job_store: Arc<dyn JobStore>,
    job_queue: Arc<dyn JobQueue>,
}

impl SubmissionService {
    pub fn new(job_store: Arc<dyn JobStore>, job_queue: Arc<dyn JobQueue>) -> Self {
        Self {
            job_store,
            job_queue,
        }
    }

    pub async fn submit(
        &self,
        record_id: String,
        document_text: String,
        schema: Schema,
    ) -> Result<Job, SubmissionError> {
        validate(&record_id, &document_text, &schema)?;

        let job = self
            .job_store
            .create(NewJob {
                record_id,
                document_text,
                schema,
            })
            .await?;

        self.job_queue.enqueue(job.id).await?;

        tracing::info!(job_id = %job.id, record_id = %job.record_id, "Job submitted");
        Ok(job)
    }

    pub async fn get(&self, id: JobId) -> Result<Job, SubmissionError> {
        Ok(self.job_store.get(id).await?)
    }

    pub async fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>, SubmissionError> {
        Ok(self.job_store.list(status, limit, offset).await?)
    }
}

fn validate(record_id: &str, document_text: &str, schema: &Schema) -> Result<(), SubmissionError> {
    if record_id.trim().is_empty() {
        return Err(SubmissionError::Validation(
            "record_id must not be empty".to_string(),
        ));
    }
    if document_text.trim().is_empty() {
        return Err(SubmissionError::Validation(
            "document_text must not be empty".to_string(),
        ));
    }
    if schema.is_empty() {
        return Err(SubmissionError::Validation(
            "schema must contain at least one field".to_string(),
        ));
    }
    for (field, instruction) in schema {
        match instruction.as_str() {
            Some(s) if !s.trim().is_empty() => {}
            _ => {
                return Err(SubmissionError::Validation(format!(
                    "schema field '{}' must map to a non-empty instruction string",
                    field
                )));
            }
        }
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("{0}")]
    Validation(String),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("queue: {0}")]
    Queue(#[from] QueueError),
}
