use common::JobId;
use thiserror::Error;

use crate::JobState;

/// Errors that can occur when interacting with the job store.
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// The job was not found in the store.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// The job was not in the state required by the operation.
    /// Typically a sign of two workers racing on the same row.
    #[error("Job {job_id} is {actual}, expected {expected}")]
    InvalidJobState {
        job_id: JobId,
        expected: JobState,
        actual: JobState,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for job store operations.
pub type Result<T> = std::result::Result<T, JobStoreError>;
