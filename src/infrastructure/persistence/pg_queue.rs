use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::application::ports::{JobQueue, QueueError};
use crate::domain::JobId;

/// Durable queue on Postgres. Leasing takes the oldest visible entry with
/// `FOR UPDATE SKIP LOCKED`, so concurrent workers never block each other
/// and never receive the same entry.
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    #[instrument(skip(self), fields(job_id = %job_id))]
    async fn enqueue(&self, job_id: JobId) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            INSERT INTO job_queue (job_id, enqueued_at)
            VALUES ($1, $2)
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self, visibility_timeout))]
    async fn lease(
        &self,
        worker_id: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<JobId>, QueueError> {
        let now = Utc::now();
        let leased_until = now
            + chrono::Duration::from_std(visibility_timeout)
                .map_err(|e| QueueError::Backend(e.to_string()))?;

        let leased: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE job_queue
            SET leased_until = $1, lease_holder = $2
            WHERE job_id = (
                SELECT job_id FROM job_queue
                WHERE leased_until IS NULL OR leased_until <= $3
                ORDER BY enqueued_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING job_id
            "#,
        )
        .bind(leased_until)
        .bind(worker_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;

        Ok(leased.map(JobId::from_uuid))
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    async fn ack(&self, job_id: JobId) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM job_queue WHERE job_id = $1")
            .bind(job_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    async fn nack(&self, job_id: JobId) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            UPDATE job_queue
            SET leased_until = NULL, lease_holder = NULL, enqueued_at = $2
            WHERE job_id = $1
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }
}
