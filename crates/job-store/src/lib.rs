pub mod backoff;
pub mod error;
pub mod job;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::JobId;
pub use error::{JobStoreError, Result};
pub use job::{DEFAULT_MAX_ATTEMPTS, DEFAULT_QUEUE, Job, JobState, NewJob};
pub use memory::InMemoryJobStore;
pub use postgres::PostgresJobStore;
pub use store::{FailOutcome, JobStore};
