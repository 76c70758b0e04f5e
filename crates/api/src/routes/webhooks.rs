//! Inbound webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use domain::TransactionStore;
use job_store::JobStore;
use serde::Serialize;
use webhooks::{WebhookError, WebhookStore};

use crate::error::ApiError;
use crate::routes::transactions::AppState;

/// Header carrying the provider's payload signature.
pub const SIGNATURE_HEADER: &str = "webhook-signature";

#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// POST /webhooks/{provider} — ingest one raw delivery.
///
/// The body is captured as raw bytes; signature verification happens later
/// against exactly these bytes. A delivery is acknowledged as soon as its
/// row is durable. Failures after that point are ours to retry, so they
/// are logged and the sender still gets a 200.
#[tracing::instrument(skip(state, headers, body))]
pub async fn receive<S, J, W>(
    State(state): State<Arc<AppState<S, J, W>>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookAck>), ApiError>
where
    S: TransactionStore + Clone + Send + Sync + 'static,
    J: JobStore + Clone + Send + Sync + 'static,
    W: WebhookStore + Clone + Send + Sync + 'static,
{
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    match state.ingestor.ingest(&provider, &body, signature).await {
        Ok(_) => Ok((StatusCode::OK, Json(WebhookAck { received: true }))),
        Err(WebhookError::InvalidEnvelope(e)) => {
            Err(ApiError::Webhook(WebhookError::InvalidEnvelope(e)))
        }
        // The insert itself failed; the row is not durable and the
        // provider must redeliver.
        Err(WebhookError::Database(e)) => Err(ApiError::Webhook(WebhookError::Database(e))),
        Err(e) => {
            tracing::error!(error = %e, "post-insert ingest failure, acknowledging anyway");
            Ok((StatusCode::OK, Json(WebhookAck { received: true })))
        }
    }
}
