mod extractor;
mod job_queue;
mod job_store;
mod record_sync;

pub use extractor::{Extractor, ExtractorError};
pub use job_queue::{JobQueue, QueueError};
pub use job_store::{JobStore, NewJob, StoreError};
pub use record_sync::{RecordSync, SyncError};
