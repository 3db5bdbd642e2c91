use std::sync::Arc;

use crate::application::services::SubmissionService;

#[derive(Clone)]
pub struct AppState {
    pub submission_service: Arc<SubmissionService>,
}
