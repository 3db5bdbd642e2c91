mod health;
mod job_list;
mod job_status;
mod submit_job;

pub use health::health_handler;
pub use job_list::job_list_handler;
pub use job_status::job_status_handler;
pub use submit_job::submit_job_handler;
