use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::application::ports::StoreError;
use crate::application::services::SubmissionError;
use crate::domain::{Job, JobId};
use crate::presentation::state::AppState;

#[derive(Serialize)]
pub struct JobResponse {
    pub id: String,
    pub record_id: String,
    pub status: String,
    pub schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorResponse>,
    pub attempt_count: u32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct JobErrorResponse {
    pub kind: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id.to_string(),
            record_id: job.record_id,
            status: job.status.as_str().to_string(),
            schema: Value::Object(job.schema),
            result: job.result.map(Value::Object),
            error: job.error.map(|e| JobErrorResponse {
                kind: e.kind.as_str().to_string(),
                message: e.message,
            }),
            attempt_count: job.attempt_count,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

#[tracing::instrument(skip(state))]
pub async fn job_status_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let uuid = match Uuid::parse_str(&job_id) {
        Ok(u) => u,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("Invalid job ID: {}", job_id),
                }),
            )
                .into_response();
        }
    };

    match state.submission_service.get(JobId::from_uuid(uuid)).await {
        Ok(job) => (StatusCode::OK, Json(JobResponse::from(job))).into_response(),
        Err(SubmissionError::Store(StoreError::NotFound(_))) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Job not found: {}", job_id),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch job status");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to fetch job: {}", e),
                }),
            )
                .into_response()
        }
    }
}
