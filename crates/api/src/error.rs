//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use webhooks::WebhookError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Caller lacks the privilege the operation requires.
    Forbidden(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Webhook ingestion error.
    Webhook(WebhookError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Webhook(err) => webhook_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match &err {
        DomainError::InvalidAmount(_)
        | DomainError::UnknownTarget(_)
        | DomainError::RefundExceedsAmount { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        DomainError::TransactionNotFound(_) | DomainError::RefundNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        DomainError::StatusConflict { .. }
        | DomainError::IllegalTransition { .. }
        | DomainError::OwnerMismatch { .. } => (StatusCode::CONFLICT, err.to_string()),
        // The intent is still being registered; the client can retry the
        // same checkout call to attach to it.
        DomainError::IntentTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, err.to_string()),
        DomainError::IntentFailed(_) => (StatusCode::PAYMENT_REQUIRED, err.to_string()),
        _ => {
            tracing::error!(error = %err, "internal domain error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn webhook_error_to_response(err: WebhookError) -> (StatusCode, String) {
    match &err {
        WebhookError::InvalidEnvelope(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        _ => {
            tracing::error!(error = %err, "internal webhook error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        ApiError::Webhook(err)
    }
}

impl From<job_store::JobStoreError> for ApiError {
    fn from(err: job_store::JobStoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
