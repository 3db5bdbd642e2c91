mod memory_queue;
mod memory_store;
mod pg_pool;
mod pg_queue;
mod pg_store;

pub use memory_queue::InMemoryJobQueue;
pub use memory_store::InMemoryJobStore;
pub use pg_pool::create_pool;
pub use pg_queue::PgJobQueue;
pub use pg_store::PgJobStore;
