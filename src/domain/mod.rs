mod job;
mod job_error;
mod job_id;
mod job_status;

pub use job::{FieldMap, Job, Schema, TransitionOutcome};
pub use job_error::{JobError, JobErrorKind};
pub use job_id::JobId;
pub use job_status::JobStatus;
