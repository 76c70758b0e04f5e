use async_trait::async_trait;
use chrono::Utc;
use common::JobId;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    FailOutcome, Job, JobState, JobStore, JobStoreError, NewJob, Result, backoff::retry_delay,
};

/// PostgreSQL-backed job store implementation.
///
/// Claim exclusivity is enforced with `FOR UPDATE SKIP LOCKED`, so
/// horizontally scaled workers never block each other or double-claim.
#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

const JOB_COLUMNS: &str = "id, kind, args, queue, priority, state, attempt, max_attempts, \
                           scheduled_at, last_error, created_at, updated_at";

impl PostgresJobStore {
    /// Creates a new PostgreSQL job store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_job(row: PgRow) -> Result<Job> {
        let state: String = row.try_get("state")?;
        let state = JobState::parse(&state).ok_or_else(|| {
            JobStoreError::Database(sqlx::Error::Decode(
                format!("unknown job state: {state}").into(),
            ))
        })?;

        Ok(Job {
            id: JobId::from_uuid(row.try_get::<Uuid, _>("id")?),
            kind: row.try_get("kind")?,
            args: row.try_get("args")?,
            queue: row.try_get("queue")?,
            priority: row.try_get("priority")?,
            state,
            attempt: row.try_get("attempt")?,
            max_attempts: row.try_get("max_attempts")?,
            scheduled_at: row.try_get("scheduled_at")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn enqueue(&self, job: NewJob) -> Result<JobId> {
        let job = job.into_job(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO jobs (id, kind, args, queue, priority, state, attempt, max_attempts,
                              scheduled_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(&job.kind)
        .bind(&job.args)
        .bind(&job.queue)
        .bind(job.priority)
        .bind(job.state.as_str())
        .bind(job.attempt)
        .bind(job.max_attempts)
        .bind(job.scheduled_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        metrics::counter!("jobs_enqueued_total").increment(1);
        Ok(job.id)
    }

    async fn claim(&self, queue: &str, worker_id: &str) -> Result<Option<Job>> {
        // Atomic claim: select one ready row skipping rows locked by
        // concurrent claimants, mark it running, return it.
        let row = sqlx::query(&format!(
            r#"
            WITH claimable AS (
                SELECT id
                FROM jobs
                WHERE queue = $1
                  AND state = 'available'
                  AND scheduled_at <= now()
                ORDER BY priority DESC, scheduled_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs j
            SET state = 'running',
                attempt = j.attempt + 1,
                updated_at = now()
            FROM claimable c
            WHERE j.id = c.id
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(queue)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let job = Self::row_to_job(row)?;
                tracing::debug!(job_id = %job.id, kind = %job.kind, worker_id, "job claimed");
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn complete(&self, id: JobId) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE jobs SET state = 'completed', updated_at = now() \
             WHERE id = $1 AND state = 'running'",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return match self.get(id).await? {
                Some(job) => Err(JobStoreError::InvalidJobState {
                    job_id: id,
                    expected: JobState::Running,
                    actual: job.state,
                }),
                None => Err(JobStoreError::JobNotFound(id)),
            };
        }

        metrics::counter!("jobs_completed_total").increment(1);
        Ok(())
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<FailOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT state, attempt, max_attempts FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(JobStoreError::JobNotFound(id))?;

        let state: String = row.try_get("state")?;
        if state != "running" {
            return Err(JobStoreError::InvalidJobState {
                job_id: id,
                expected: JobState::Running,
                actual: JobState::parse(&state).unwrap_or_default(),
            });
        }

        let attempt: i32 = row.try_get("attempt")?;
        let max_attempts: i32 = row.try_get("max_attempts")?;

        let outcome = if attempt < max_attempts {
            let at = Utc::now() + retry_delay(attempt);
            sqlx::query(
                "UPDATE jobs SET state = 'available', scheduled_at = $2, last_error = $3, \
                 updated_at = now() WHERE id = $1",
            )
            .bind(id.as_uuid())
            .bind(at)
            .bind(error)
            .execute(&mut *tx)
            .await?;
            metrics::counter!("jobs_retried_total").increment(1);
            FailOutcome::Rescheduled(at)
        } else {
            sqlx::query(
                "UPDATE jobs SET state = 'discarded', last_error = $2, updated_at = now() \
                 WHERE id = $1",
            )
            .bind(id.as_uuid())
            .bind(error)
            .execute(&mut *tx)
            .await?;
            metrics::counter!("jobs_discarded_total").increment(1);
            FailOutcome::Discarded
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn discard(&self, id: JobId, error: &str) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE jobs SET state = 'discarded', last_error = $2, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(JobStoreError::JobNotFound(id));
        }

        metrics::counter!("jobs_discarded_total").increment(1);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_job).transpose()
    }

    async fn list_discarded(&self, limit: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE state = 'discarded' \
             ORDER BY updated_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_job).collect()
    }

    async fn count_in_state(&self, state: JobState) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE state = $1")
            .bind(state.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }
}
