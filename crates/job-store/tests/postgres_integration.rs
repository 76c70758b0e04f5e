//! PostgreSQL integration tests for the job store.
//!
//! These tests need a Docker daemon for the throwaway Postgres container
//! and are ignored by default. Run with:
//!
//! ```bash
//! cargo test -p job-store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use job_store::{DEFAULT_QUEUE, FailOutcome, JobState, JobStore, NewJob, PostgresJobStore};
use serde_json::json;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests.
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/001_create_jobs_table.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables.
async fn get_test_store() -> PostgresJobStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE jobs")
        .execute(&pool)
        .await
        .unwrap();

    PostgresJobStore::new(pool)
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_enqueue_claim_complete() {
    let store = get_test_store().await;

    let id = store
        .enqueue(NewJob::new("create_intent", json!({"transaction": "t1"})))
        .await
        .unwrap();

    let job = store.claim(DEFAULT_QUEUE, "w1").await.unwrap().unwrap();
    assert_eq!(job.id, id);
    assert_eq!(job.state, JobState::Running);
    assert_eq!(job.attempt, 1);

    assert!(store.claim(DEFAULT_QUEUE, "w2").await.unwrap().is_none());

    store.complete(id).await.unwrap();
    let job = store.get(id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_priority_ordering() {
    let store = get_test_store().await;

    let low = store
        .enqueue(NewJob::new("a", json!({})).with_priority(0))
        .await
        .unwrap();
    let high = store
        .enqueue(NewJob::new("b", json!({})).with_priority(9))
        .await
        .unwrap();

    assert_eq!(
        store.claim(DEFAULT_QUEUE, "w1").await.unwrap().unwrap().id,
        high
    );
    assert_eq!(
        store.claim(DEFAULT_QUEUE, "w1").await.unwrap().unwrap().id,
        low
    );
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_fail_to_dead_letter() {
    let store = get_test_store().await;

    let id = store
        .enqueue(NewJob::new("doomed", json!({})).with_max_attempts(1))
        .await
        .unwrap();

    let job = store.claim(DEFAULT_QUEUE, "w1").await.unwrap().unwrap();
    let outcome = store.fail(job.id, "declined").await.unwrap();
    assert_eq!(outcome, FailOutcome::Discarded);

    let dead = store.list_discarded(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, id);
    assert_eq!(dead[0].last_error.as_deref(), Some("declined"));
}
