pub mod memory;
pub mod model;
pub mod pg;
pub mod processor;
pub mod retry;
pub mod store;

pub use memory::MemoryJobStore;
pub use model::{Job, JobStatus, NewJob, QueueCounts, DEFAULT_MAX_RETRIES};
pub use pg::PgJobStore;
pub use processor::{BatchSummary, JobProcessor, ProcessorConfig, ProgressHandle, MAX_BATCH_SIZE};
pub use store::{JobStore, StoreError};
