use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::application::services::SubmissionError;
use crate::domain::Schema;
use crate::presentation::state::AppState;

#[derive(Deserialize)]
pub struct SubmitJobRequest {
    pub record_id: String,
    pub document_text: String,
    pub schema: Schema,
}

#[derive(Serialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Accepts a document for processing. The response is immediate: the job is
/// created and enqueued synchronously, extraction happens asynchronously and
/// is observed by polling the status endpoints.
#[tracing::instrument(skip(state, request), fields(record_id = %request.record_id))]
pub async fn submit_job_handler(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> impl IntoResponse {
    match state
        .submission_service
        .submit(request.record_id, request.document_text, request.schema)
        .await
    {
        Ok(job) => (
            StatusCode::CREATED,
            Json(SubmitJobResponse {
                job_id: job.id.to_string(),
            }),
        )
            .into_response(),
        Err(SubmissionError::Validation(message)) => {
            tracing::warn!(error = %message, "Submission rejected");
            (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message })).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to submit job");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to submit job: {}", e),
                }),
            )
                .into_response()
        }
    }
}
