//! Transaction lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::{Money, TransactionId, UserId};
use domain::{
    EffectiveStatus, Refund, Transaction, TransactionService, TransactionStore,
};
use job_store::JobStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webhooks::{Ingestor, WebhookStore};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S, J, W>
where
    S: TransactionStore + Clone,
    J: JobStore + Clone,
    W: WebhookStore + Clone,
{
    pub service: TransactionService<S, J>,
    pub ingestor: Ingestor<W, J>,
    pub job_store: J,
    /// Bearer token required for privileged operations (refunds).
    pub operator_token: String,
}

/// Checks the `Authorization: Bearer` header against the configured
/// operator token. Refunds move money back out, so any caller able to
/// reach the API must not be able to trigger them.
fn require_operator(headers: &HeaderMap, operator_token: &str) -> Result<(), ApiError> {
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if token == operator_token => Ok(()),
        _ => Err(ApiError::Forbidden(
            "operator privilege required".to_string(),
        )),
    }
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateTransactionRequest {
    pub user_id: Uuid,
    pub target_type: String,
    pub target_id: Uuid,
    pub amount_cents: i64,
    pub description: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct RefundRequest {
    /// Omitted means the full refundable remainder.
    pub amount_cents: Option<i64>,
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub transaction_id: String,
    pub client_secret: String,
    pub capture_mode: String,
}

#[derive(Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub owner_id: String,
    pub target_type: String,
    pub target_id: String,
    pub amount_cents: i64,
    pub refunded_cents: i64,
    pub currency: String,
    pub status: String,
    pub capture_mode: String,
    pub description: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct RefundResponse {
    pub id: String,
    pub transaction_id: String,
    pub amount_cents: i64,
    pub status: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
}

fn checkout_response(ready: domain::CheckoutReady) -> CheckoutResponse {
    CheckoutResponse {
        transaction_id: ready.transaction_id.to_string(),
        client_secret: ready.client_secret,
        capture_mode: ready.capture_mode.as_str().to_string(),
    }
}

/// Builds the client view of a transaction. The provider secret is only
/// ever returned from the checkout call, never from reads.
fn transaction_response(tx: &Transaction, refunded: Money) -> TransactionResponse {
    let status = EffectiveStatus::compute(tx.status, refunded, tx.amount);
    TransactionResponse {
        id: tx.id.to_string(),
        owner_id: tx.owner_id.to_string(),
        target_type: tx.target.target_type.clone(),
        target_id: tx.target.target_id.to_string(),
        amount_cents: tx.amount.cents(),
        refunded_cents: refunded.cents(),
        currency: tx.currency.clone(),
        status: status.as_str().to_string(),
        capture_mode: tx.capture_mode.as_str().to_string(),
        description: tx.description.clone(),
        error_message: tx.error_message.clone(),
        created_at: tx.created_at,
        completed_at: tx.completed_at,
    }
}

fn refund_response(refund: &Refund) -> RefundResponse {
    RefundResponse {
        id: refund.id.to_string(),
        transaction_id: refund.transaction_id.to_string(),
        amount_cents: refund.amount.cents(),
        status: refund.status.as_str().to_string(),
        reason: refund.reason.clone(),
        created_at: refund.created_at,
    }
}

// -- Handlers --

/// POST /transactions — start (or resume) a checkout.
#[tracing::instrument(skip(state, req))]
pub async fn create<S, J, W>(
    State(state): State<Arc<AppState<S, J, W>>>,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError>
where
    S: TransactionStore + Clone + Send + Sync + 'static,
    J: JobStore + Clone + Send + Sync + 'static,
    W: WebhookStore + Clone + Send + Sync + 'static,
{
    let ready = state
        .service
        .create_transaction(
            UserId::from_uuid(req.user_id),
            domain::TargetRef::new(req.target_type, req.target_id),
            Money::from_cents(req.amount_cents),
            req.description,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(checkout_response(ready))))
}

/// GET /transactions/{id} — fetch one transaction with refund totals.
#[tracing::instrument(skip(state))]
pub async fn get<S, J, W>(
    State(state): State<Arc<AppState<S, J, W>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, ApiError>
where
    S: TransactionStore + Clone + Send + Sync + 'static,
    J: JobStore + Clone + Send + Sync + 'static,
    W: WebhookStore + Clone + Send + Sync + 'static,
{
    let id = TransactionId::from_uuid(id);
    let tx = state
        .service
        .store()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("transaction not found: {id}")))?;
    let refunded = state.service.store().refunded_total(id).await?;
    Ok(Json(transaction_response(&tx, refunded)))
}

/// POST /transactions/{id}/refunds — start a (partial) refund.
/// Requires the operator bearer token.
#[tracing::instrument(skip(state, headers, req))]
pub async fn refund<S, J, W>(
    State(state): State<Arc<AppState<S, J, W>>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<RefundRequest>,
) -> Result<(StatusCode, Json<RefundResponse>), ApiError>
where
    S: TransactionStore + Clone + Send + Sync + 'static,
    J: JobStore + Clone + Send + Sync + 'static,
    W: WebhookStore + Clone + Send + Sync + 'static,
{
    require_operator(&headers, &state.operator_token)?;
    let refund = state
        .service
        .refund_transaction(
            TransactionId::from_uuid(id),
            req.amount_cents.map(Money::from_cents),
            req.reason,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(refund_response(&refund))))
}

/// GET /transactions/{id}/refunds — list refunds, oldest first.
#[tracing::instrument(skip(state))]
pub async fn list_refunds<S, J, W>(
    State(state): State<Arc<AppState<S, J, W>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RefundResponse>>, ApiError>
where
    S: TransactionStore + Clone + Send + Sync + 'static,
    J: JobStore + Clone + Send + Sync + 'static,
    W: WebhookStore + Clone + Send + Sync + 'static,
{
    let refunds = state
        .service
        .store()
        .refunds_for_transaction(TransactionId::from_uuid(id))
        .await?;
    Ok(Json(refunds.iter().map(refund_response).collect()))
}

/// POST /transactions/{id}/capture — capture a deferred-mode transaction.
#[tracing::instrument(skip(state))]
pub async fn capture<S, J, W>(
    State(state): State<Arc<AppState<S, J, W>>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError>
where
    S: TransactionStore + Clone + Send + Sync + 'static,
    J: JobStore + Clone + Send + Sync + 'static,
    W: WebhookStore + Clone + Send + Sync + 'static,
{
    state
        .service
        .capture_transaction(TransactionId::from_uuid(id))
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "capture_requested",
        }),
    ))
}

/// POST /transactions/{id}/cancel — void an open transaction's intent.
#[tracing::instrument(skip(state))]
pub async fn cancel<S, J, W>(
    State(state): State<Arc<AppState<S, J, W>>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError>
where
    S: TransactionStore + Clone + Send + Sync + 'static,
    J: JobStore + Clone + Send + Sync + 'static,
    W: WebhookStore + Clone + Send + Sync + 'static,
{
    state
        .service
        .cancel_transaction(TransactionId::from_uuid(id))
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "cancel_requested",
        }),
    ))
}

/// POST /transactions/{id}/retry — new checkout for a failed transaction.
#[tracing::instrument(skip(state))]
pub async fn retry<S, J, W>(
    State(state): State<Arc<AppState<S, J, W>>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError>
where
    S: TransactionStore + Clone + Send + Sync + 'static,
    J: JobStore + Clone + Send + Sync + 'static,
    W: WebhookStore + Clone + Send + Sync + 'static,
{
    let ready = state
        .service
        .retry_transaction(TransactionId::from_uuid(id))
        .await?;
    Ok((StatusCode::CREATED, Json(checkout_response(ready))))
}
