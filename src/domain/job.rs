use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{JobError, JobId, JobStatus};

/// Ordered map of field name to natural-language extraction instruction.
///
/// Schemas are caller-supplied data and may differ per job; the extraction
/// engine takes them as a runtime parameter, never a compile-time type.
/// `serde_json` is built with `preserve_order`, so submission order survives
/// into the prompt and the result.
pub type Schema = serde_json::Map<String, Value>;

/// Ordered map of field name to extracted value. Every schema key is
/// present; "not found" is an explicit JSON `null`, never an absent key.
pub type FieldMap = serde_json::Map<String, Value>;

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub record_id: String,
    pub document_text: String,
    pub schema: Schema,
    pub status: JobStatus,
    pub result: Option<FieldMap>,
    pub error: Option<JobError>,
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(record_id: String, document_text: String, schema: Schema) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            record_id,
            document_text,
            schema,
            status: JobStatus::Queued,
            result: None,
            error: None,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Payload committed together with a status transition. Outcomes are only
/// legal on transitions into a terminal status.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    None,
    Result(FieldMap),
    Error(JobError),
}
