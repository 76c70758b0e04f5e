use common::WebhookEventId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    /// The raw body could not be parsed far enough to extract the event
    /// id and type. Undeduplicatable, so rejected at the edge.
    #[error("invalid webhook envelope: {0}")]
    InvalidEnvelope(String),

    #[error("webhook event not found: {0}")]
    EventNotFound(WebhookEventId),

    /// Another worker holds the event's processing claim.
    #[error("webhook event {0} is already being processed")]
    AlreadyClaimed(WebhookEventId),

    #[error("job store error: {0}")]
    JobStore(#[from] job_store::JobStoreError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WebhookError>;
