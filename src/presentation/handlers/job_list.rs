use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::domain::{Job, JobStatus};
use crate::presentation::state::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;

#[derive(Deserialize)]
pub struct ListJobsParams {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Trimmed-down job view for the dashboard table; the full record (schema,
/// result, document text) stays behind the per-job endpoint.
#[derive(Serialize)]
pub struct JobSummary {
    pub id: String,
    pub record_id: String,
    pub status: String,
    pub attempt_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobSummary>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<Job> for JobSummary {
    fn from(job: Job) -> Self {
        Self {
            id: job.id.to_string(),
            record_id: job.record_id,
            status: job.status.as_str().to_string(),
            attempt_count: job.attempt_count,
            error_kind: job.error.map(|e| e.kind.as_str().to_string()),
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

#[tracing::instrument(skip(state, params))]
pub async fn job_list_handler(
    State(state): State<AppState>,
    Query(params): Query<ListJobsParams>,
) -> impl IntoResponse {
    let status = match params.status.as_deref() {
        Some(raw) => match raw.to_uppercase().parse::<JobStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: format!("Invalid status filter: {}", raw),
                    }),
                )
                    .into_response();
            }
        },
        None => None,
    };

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let offset = params.offset.unwrap_or(0);

    match state.submission_service.list(status, limit, offset).await {
        Ok(jobs) => (
            StatusCode::OK,
            Json(ListJobsResponse {
                jobs: jobs.into_iter().map(JobSummary::from).collect(),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list jobs");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to list jobs: {}", e),
                }),
            )
                .into_response()
        }
    }
}
