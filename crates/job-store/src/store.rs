use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::JobId;

use crate::{Job, JobState, NewJob, Result};

/// What happened to a job reported as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Attempts remain; the job is available again at the given time.
    Rescheduled(DateTime<Utc>),
    /// Attempt budget exhausted; the job is dead-lettered.
    Discarded,
}

/// Core trait for durable job queue implementations.
///
/// The store is the only coordination point between workers: claims must
/// be exclusive (two workers can never claim the same available job), and
/// failure reporting owns the retry/dead-letter decision.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists a new job and returns its id.
    async fn enqueue(&self, job: NewJob) -> Result<JobId>;

    /// Claims the next available job on a queue, if any.
    ///
    /// Candidates are jobs in `Available` state whose `scheduled_at` has
    /// passed, ordered by priority (highest first) then `scheduled_at`
    /// (oldest first). Rows being claimed by a concurrent worker are
    /// skipped rather than waited on. The claimed job is moved to
    /// `Running` with its attempt counter incremented before it is
    /// returned.
    async fn claim(&self, queue: &str, worker_id: &str) -> Result<Option<Job>>;

    /// Marks a running job as completed.
    async fn complete(&self, id: JobId) -> Result<()>;

    /// Reports a running job as failed.
    ///
    /// While attempts remain the job is rescheduled `Available` with an
    /// exponential-backoff delay; otherwise it is moved to `Discarded`.
    /// The error is retained either way.
    async fn fail(&self, id: JobId, error: &str) -> Result<FailOutcome>;

    /// Moves a running job straight to `Discarded`, bypassing retries.
    ///
    /// Used for unroutable jobs (unknown kind) and permanent errors where
    /// a retry could duplicate an external side effect.
    async fn discard(&self, id: JobId, error: &str) -> Result<()>;

    /// Fetches a job by id.
    async fn get(&self, id: JobId) -> Result<Option<Job>>;

    /// Lists dead-lettered jobs for operator triage, newest first.
    async fn list_discarded(&self, limit: i64) -> Result<Vec<Job>>;

    /// Counts jobs currently in the given state.
    async fn count_in_state(&self, state: JobState) -> Result<u64>;
}
