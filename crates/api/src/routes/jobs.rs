//! Operator endpoints for the job queue.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use domain::TransactionStore;
use job_store::JobStore;
use serde::{Deserialize, Serialize};
use webhooks::WebhookStore;

use crate::error::ApiError;
use crate::routes::transactions::AppState;

#[derive(Debug, Deserialize)]
pub struct DiscardedQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Serialize)]
pub struct DiscardedJobResponse {
    pub id: String,
    pub kind: String,
    pub queue: String,
    pub attempt: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// GET /jobs/discarded — dead-lettered jobs for triage, newest first.
#[tracing::instrument(skip(state))]
pub async fn discarded<S, J, W>(
    State(state): State<Arc<AppState<S, J, W>>>,
    Query(query): Query<DiscardedQuery>,
) -> Result<Json<Vec<DiscardedJobResponse>>, ApiError>
where
    S: TransactionStore + Clone + Send + Sync + 'static,
    J: JobStore + Clone + Send + Sync + 'static,
    W: WebhookStore + Clone + Send + Sync + 'static,
{
    let jobs = state.job_store.list_discarded(query.limit).await?;
    Ok(Json(
        jobs.into_iter()
            .map(|job| DiscardedJobResponse {
                id: job.id.to_string(),
                kind: job.kind,
                queue: job.queue,
                attempt: job.attempt,
                max_attempts: job.max_attempts,
                last_error: job.last_error,
                updated_at: job.updated_at,
            })
            .collect(),
    ))
}
