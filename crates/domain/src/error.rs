use common::{Money, RefundId, TransactionId};
use thiserror::Error;

use crate::status::TransactionStatus;

/// Errors produced by the transaction domain.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Amount must be strictly positive.
    #[error("Invalid amount: {0}")]
    InvalidAmount(Money),

    /// The target type is not registered as payable in the catalog.
    #[error("Unknown payable target type: {0}")]
    UnknownTarget(String),

    /// The transaction was not found.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// The refund was not found.
    #[error("Refund not found: {0}")]
    RefundNotFound(RefundId),

    /// The target's open transaction belongs to a different owner.
    #[error("Target is being paid for by another user")]
    OwnerMismatch { id: TransactionId },

    /// The transaction was not in the status required by the operation.
    #[error("Transaction {id} is {actual}, expected {expected}")]
    StatusConflict {
        id: TransactionId,
        expected: TransactionStatus,
        actual: TransactionStatus,
    },

    /// The requested transition is not part of the state machine.
    #[error("Illegal transition for transaction {id}: {from} -> {to}")]
    IllegalTransition {
        id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// The refund would push the refunded total past the transaction amount.
    #[error("Refund of {requested} exceeds remaining refundable amount {remaining}")]
    RefundExceedsAmount { requested: Money, remaining: Money },

    /// The provider intent was not ready within the synchronous wait bound.
    /// The in-flight job keeps running; the caller should retry later.
    #[error("Transaction {0} is not payable yet; try again shortly")]
    IntentTimeout(TransactionId),

    /// Intent creation failed permanently.
    #[error("Payment could not be initiated: {0}")]
    IntentFailed(String),

    /// A job store error occurred while enqueuing side effects.
    #[error("Job store error: {0}")]
    JobStore(#[from] job_store::JobStoreError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
