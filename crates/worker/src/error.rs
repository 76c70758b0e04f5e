use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("malformed job args: {0}")]
    BadArgs(#[from] serde_json::Error),

    #[error("domain error: {0}")]
    Domain(#[from] domain::DomainError),

    #[error("webhook error: {0}")]
    Webhook(#[from] webhooks::WebhookError),

    #[error("job store error: {0}")]
    JobStore(#[from] job_store::JobStoreError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("notification delivery failed: {0}")]
    Notify(String),

    #[error("webhook handler error: {0}")]
    Handler(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
