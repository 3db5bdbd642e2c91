mod submission;
mod worker;

pub use submission::{SubmissionError, SubmissionService};
pub use worker::{WorkerConfig, WorkerPool, WorkerPoolHandle};
