use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use crate::application::ports::{JobStore, NewJob, StoreError};
use crate::domain::{Job, JobError, JobErrorKind, JobId, JobStatus, TransitionOutcome};

/// Durable job store on Postgres. Uses the runtime query API so the crate
/// builds without a live database; the schema lives in `migrations/`.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[instrument(skip(self, new_job), fields(record_id = %new_job.record_id))]
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let job = Job::new(new_job.record_id, new_job.document_text, new_job.schema);

        // Object columns are bound as serialized text and cast to JSON so
        // the caller's key order reaches the column verbatim; a JSONB bind
        // would reorder keys server-side.
        sqlx::query(
            r#"
            INSERT INTO jobs
                (id, record_id, document_text, schema, status, attempt_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4::json, $5, $6, $7, $8)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(&job.record_id)
        .bind(&job.document_text)
        .bind(Value::Object(job.schema.clone()).to_string())
        .bind(job.status.as_str())
        .bind(job.attempt_count as i32)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(job)
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        match row {
            Some(row) => job_from_row(&row),
            None => Err(StoreError::NotFound(id)),
        }
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>, StoreError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    r#"
                    SELECT * FROM jobs
                    WHERE status = $1
                    ORDER BY created_at DESC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(status.as_str())
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT * FROM jobs
                    ORDER BY created_at DESC
                    LIMIT $1 OFFSET $2
                    "#,
                )
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self, outcome), fields(job_id = %id, expected = %expected, new = %new))]
    async fn transition(
        &self,
        id: JobId,
        expected: JobStatus,
        new: JobStatus,
        outcome: TransitionOutcome,
    ) -> Result<Job, StoreError> {
        let (result, error) = match (new, outcome) {
            (JobStatus::Completed, TransitionOutcome::Result(fields)) => {
                (Some(Value::Object(fields).to_string()), None)
            }
            (JobStatus::Failed, TransitionOutcome::Error(error)) => (None, Some(error)),
            (s, TransitionOutcome::None) if !s.is_terminal() => (None, None),
            (s, _) => {
                return Err(StoreError::Backend(format!(
                    "invalid outcome payload for transition to {}",
                    s
                )));
            }
        };

        // The WHERE clause is the compare-and-swap: between two racing
        // callers, the row matches for exactly one of them.
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $3, result = $4::json, error_kind = $5, error_message = $6, updated_at = $7
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .bind(new.as_str())
        .bind(result)
        .bind(error.as_ref().map(|e| e.kind.as_str()))
        .bind(error.as_ref().map(|e| e.message.as_str()))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        match row {
            Some(row) => job_from_row(&row),
            None => {
                let actual: Option<String> =
                    sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1")
                        .bind(id.as_uuid())
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                match actual {
                    Some(actual) => Err(StoreError::Conflict {
                        expected,
                        actual: actual.parse().map_err(StoreError::Backend)?,
                    }),
                    None => Err(StoreError::NotFound(id)),
                }
            }
        }
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn increment_attempt(&self, id: JobId) -> Result<u32, StoreError> {
        let attempts: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET attempt_count = attempt_count + 1
            WHERE id = $1
            RETURNING attempt_count
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        match attempts {
            Some(n) => Ok(n as u32),
            None => Err(StoreError::NotFound(id)),
        }
    }
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let backend = |e: sqlx::Error| StoreError::Backend(e.to_string());

    let status: String = row.try_get("status").map_err(backend)?;
    let status: JobStatus = status.parse().map_err(StoreError::Backend)?;

    let schema: Value = row.try_get("schema").map_err(backend)?;
    let schema = match schema {
        Value::Object(map) => map,
        other => {
            return Err(StoreError::Backend(format!(
                "schema column is not a JSON object: {}",
                other
            )));
        }
    };

    let result: Option<Value> = row.try_get("result").map_err(backend)?;
    let result = match result {
        Some(Value::Object(map)) => Some(map),
        Some(other) => {
            return Err(StoreError::Backend(format!(
                "result column is not a JSON object: {}",
                other
            )));
        }
        None => None,
    };

    let error_kind: Option<String> = row.try_get("error_kind").map_err(backend)?;
    let error_message: Option<String> = row.try_get("error_message").map_err(backend)?;
    let error = match (error_kind, error_message) {
        (Some(kind), message) => {
            let kind: JobErrorKind = kind.parse().map_err(StoreError::Backend)?;
            Some(JobError::new(kind, message.unwrap_or_default()))
        }
        (None, _) => None,
    };

    let attempt_count: i32 = row.try_get("attempt_count").map_err(backend)?;

    Ok(Job {
        id: JobId::from_uuid(row.try_get("id").map_err(backend)?),
        record_id: row.try_get("record_id").map_err(backend)?,
        document_text: row.try_get("document_text").map_err(backend)?,
        schema,
        status,
        result,
        error,
        attempt_count: attempt_count as u32,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use crate::domain::Schema;

    // The JSON columns keep whatever text we hand them, so the ordered
    // round-trip rests on the serialized form matching insertion order on
    // both sides.
    #[test]
    fn given_schema_with_unsorted_keys_when_serialized_then_insertion_order_kept() {
        let mut schema = Schema::new();
        schema.insert("total".to_string(), json!("extract total"));
        schema.insert("vendor".to_string(), json!("extract vendor"));
        schema.insert("date".to_string(), json!("extract date"));

        let text = Value::Object(schema.clone()).to_string();
        assert_eq!(
            text,
            r#"{"total":"extract total","vendor":"extract vendor","date":"extract date"}"#
        );

        let parsed: Value = serde_json::from_str(&text).unwrap();
        let Value::Object(parsed) = parsed else {
            panic!("round-trip lost the object shape");
        };
        let keys: Vec<_> = parsed.keys().collect();
        assert_eq!(keys, ["total", "vendor", "date"]);
    }
}
