use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::JobId;
use tokio::sync::RwLock;

use crate::{
    FailOutcome, Job, JobState, JobStore, JobStoreError, NewJob, Result, backoff::retry_delay,
};

/// In-memory job store implementation for testing and development.
///
/// Provides the same claim/complete/fail semantics as the PostgreSQL
/// implementation; exclusivity comes from holding the write lock for the
/// whole claim operation.
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl InMemoryJobStore {
    /// Creates a new empty in-memory job store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of jobs stored.
    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Returns all jobs of a given kind, oldest first.
    pub async fn jobs_of_kind(&self, kind: &str) -> Vec<Job> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<_> = jobs.values().filter(|j| j.kind == kind).cloned().collect();
        matching.sort_by_key(|j| j.created_at);
        matching
    }

    /// Clears all jobs.
    pub async fn clear(&self) {
        self.jobs.write().await.clear();
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: NewJob) -> Result<JobId> {
        let job = job.into_job(Utc::now());
        let id = job.id;
        self.jobs.write().await.insert(id, job);
        metrics::counter!("jobs_enqueued_total").increment(1);
        Ok(id)
    }

    async fn claim(&self, queue: &str, worker_id: &str) -> Result<Option<Job>> {
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;

        // Highest priority first, then oldest scheduled_at.
        let candidate = jobs
            .values()
            .filter(|j| j.queue == queue && j.state == JobState::Available && j.scheduled_at <= now)
            .min_by_key(|j| (-j.priority, j.scheduled_at, j.id.as_uuid()))
            .map(|j| j.id);

        let Some(id) = candidate else {
            return Ok(None);
        };

        let job = jobs.get_mut(&id).ok_or(JobStoreError::JobNotFound(id))?;
        job.state = JobState::Running;
        job.attempt += 1;
        job.updated_at = now;
        tracing::debug!(job_id = %id, kind = %job.kind, worker_id, "job claimed");
        Ok(Some(job.clone()))
    }

    async fn complete(&self, id: JobId) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::JobNotFound(id))?;
        if job.state != JobState::Running {
            return Err(JobStoreError::InvalidJobState {
                job_id: id,
                expected: JobState::Running,
                actual: job.state,
            });
        }
        job.state = JobState::Completed;
        job.updated_at = Utc::now();
        metrics::counter!("jobs_completed_total").increment(1);
        Ok(())
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<FailOutcome> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::JobNotFound(id))?;
        if job.state != JobState::Running {
            return Err(JobStoreError::InvalidJobState {
                job_id: id,
                expected: JobState::Running,
                actual: job.state,
            });
        }

        job.last_error = Some(error.to_string());
        job.updated_at = Utc::now();

        if job.has_attempts_remaining() {
            let at = Utc::now() + retry_delay(job.attempt);
            job.state = JobState::Available;
            job.scheduled_at = at;
            metrics::counter!("jobs_retried_total").increment(1);
            Ok(FailOutcome::Rescheduled(at))
        } else {
            job.state = JobState::Discarded;
            metrics::counter!("jobs_discarded_total").increment(1);
            Ok(FailOutcome::Discarded)
        }
    }

    async fn discard(&self, id: JobId, error: &str) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::JobNotFound(id))?;
        job.state = JobState::Discarded;
        job.last_error = Some(error.to_string());
        job.updated_at = Utc::now();
        metrics::counter!("jobs_discarded_total").increment(1);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list_discarded(&self, limit: i64) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut discarded: Vec<_> = jobs
            .values()
            .filter(|j| j.state == JobState::Discarded)
            .cloned()
            .collect();
        discarded.sort_by_key(|j| std::cmp::Reverse(j.updated_at));
        discarded.truncate(limit.max(0) as usize);
        Ok(discarded)
    }

    async fn count_in_state(&self, state: JobState) -> Result<u64> {
        let jobs = self.jobs.read().await;
        Ok(jobs.values().filter(|j| j.state == state).count() as u64)
    }
}
