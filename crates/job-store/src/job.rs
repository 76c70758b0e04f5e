//! Job model and lifecycle states.

use chrono::{DateTime, Utc};
use common::JobId;
use serde::{Deserialize, Serialize};

/// Default queue jobs are enqueued on when no queue is named.
pub const DEFAULT_QUEUE: &str = "default";

/// Default number of attempts before a job is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// The state of a job in its lifecycle.
///
/// State transitions:
/// ```text
/// Available ──► Running ──► Completed
///    ▲             │
///    └─────────────┴──► Discarded
/// ```
///
/// A failed `Running` job goes back to `Available` with a later
/// `scheduled_at` while attempts remain, otherwise to `Discarded`.
/// `Discarded` is a dead-letter state kept for operator inspection,
/// never silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Ready to be claimed once `scheduled_at` has passed.
    #[default]
    Available,

    /// Claimed by a worker, execution in progress.
    Running,

    /// Finished successfully (terminal state).
    Completed,

    /// Exhausted its attempts or was unroutable (terminal state).
    Discarded,
}

impl JobState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Discarded)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Available => "available",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Discarded => "discarded",
        }
    }

    /// Parses a state from its string name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(JobState::Available),
            "running" => Some(JobState::Running),
            "completed" => Some(JobState::Completed),
            "discarded" => Some(JobState::Discarded),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of work persisted in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// String key selecting a handler at dispatch time.
    pub kind: String,
    /// Structured handler payload.
    pub args: serde_json::Value,
    /// Named partition workers subscribe to independently.
    pub queue: String,
    /// Higher priority is claimed first within a queue.
    pub priority: i16,
    pub state: JobState,
    /// Attempts consumed so far (incremented on claim failure reporting).
    pub attempt: i32,
    pub max_attempts: i32,
    /// Earliest time the job may be claimed.
    pub scheduled_at: DateTime<Utc>,
    /// Error reported by the most recent failed attempt.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Returns true if the job has attempts remaining after `attempt` failures.
    pub fn has_attempts_remaining(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

/// Parameters for enqueuing a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub kind: String,
    pub args: serde_json::Value,
    pub queue: String,
    pub priority: i16,
    pub max_attempts: i32,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NewJob {
    /// Creates a new job with default queue, priority, and attempt budget.
    pub fn new(kind: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            args,
            queue: DEFAULT_QUEUE.to_string(),
            priority: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            scheduled_at: None,
        }
    }

    /// Places the job on a named queue.
    pub fn on_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Sets the claim priority (higher first).
    pub fn with_priority(mut self, priority: i16) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the attempt budget before dead-lettering.
    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Schedules the job to run no earlier than the given time.
    pub fn run_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// Materializes the job row.
    pub fn into_job(self, now: DateTime<Utc>) -> Job {
        Job {
            id: JobId::new(),
            kind: self.kind,
            args: self.args,
            queue: self.queue,
            priority: self.priority,
            state: JobState::Available,
            attempt: 0,
            max_attempts: self.max_attempts,
            scheduled_at: self.scheduled_at.unwrap_or(now),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_state_is_available() {
        assert_eq!(JobState::default(), JobState::Available);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Available.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Discarded.is_terminal());
    }

    #[test]
    fn test_state_parse_roundtrip() {
        for state in [
            JobState::Available,
            JobState::Running,
            JobState::Completed,
            JobState::Discarded,
        ] {
            assert_eq!(JobState::parse(state.as_str()), Some(state));
        }
        assert_eq!(JobState::parse("bogus"), None);
    }

    #[test]
    fn test_new_job_defaults() {
        let now = Utc::now();
        let job = NewJob::new("notify", json!({"user": 1})).into_job(now);

        assert_eq!(job.queue, DEFAULT_QUEUE);
        assert_eq!(job.priority, 0);
        assert_eq!(job.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(job.state, JobState::Available);
        assert_eq!(job.attempt, 0);
        assert_eq!(job.scheduled_at, now);
        assert!(job.has_attempts_remaining());
    }

    #[test]
    fn test_new_job_builder() {
        let now = Utc::now();
        let later = now + chrono::Duration::minutes(5);
        let job = NewJob::new("sync_target", json!({}))
            .on_queue("sync")
            .with_priority(3)
            .with_max_attempts(1)
            .run_at(later)
            .into_job(now);

        assert_eq!(job.queue, "sync");
        assert_eq!(job.priority, 3);
        assert_eq!(job.max_attempts, 1);
        assert_eq!(job.scheduled_at, later);
    }
}
