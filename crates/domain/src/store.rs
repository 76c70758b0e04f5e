use async_trait::async_trait;
use common::{Money, RefundId, TransactionId};

use crate::error::Result;
use crate::model::{Refund, TargetRef, Transaction};
use crate::status::{RefundStatus, TransactionStatus};

/// Fields applied alongside a status transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionUpdate {
    pub to: TransactionStatus,
    pub provider_reference: Option<String>,
    pub provider_secret: Option<String>,
    pub error_message: Option<String>,
}

impl TransitionUpdate {
    /// Creates an update moving to the given status.
    pub fn to(status: TransactionStatus) -> Self {
        Self {
            to: status,
            ..Default::default()
        }
    }

    /// Records the provider's intent reference and client secret.
    pub fn with_intent(mut self, reference: impl Into<String>, secret: impl Into<String>) -> Self {
        self.provider_reference = Some(reference.into());
        self.provider_secret = Some(secret.into());
        self
    }

    /// Records an error message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }
}

/// Result of a guarded transition attempt.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The compare-and-swap matched and the transition was applied.
    Applied(Transaction),
    /// The transaction had already settled; the attempt was absorbed as a
    /// no-op. Late duplicate webhook deliveries land here.
    AlreadySettled(Transaction),
}

impl TransitionOutcome {
    /// Returns the transaction regardless of outcome.
    pub fn transaction(&self) -> &Transaction {
        match self {
            TransitionOutcome::Applied(tx) | TransitionOutcome::AlreadySettled(tx) => tx,
        }
    }

    /// Returns true if the transition was actually applied.
    pub fn was_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// Core trait for transaction persistence.
///
/// `transition` is the only mutation path for transaction status: a
/// compare-and-swap conditioned on the expected current status. A CAS miss
/// on a settled row is a no-op, never an overwrite, so webhook redelivery
/// and racing workers stay safe.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persists a new transaction row.
    async fn insert(&self, tx: &Transaction) -> Result<()>;

    /// Fetches a transaction by id.
    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>>;

    /// Fetches a transaction by the provider's intent reference.
    async fn get_by_provider_reference(&self, reference: &str) -> Result<Option<Transaction>>;

    /// Returns the current (most recently created) transaction for a target.
    async fn current_for_target(&self, target: &TargetRef) -> Result<Option<Transaction>>;

    /// Atomically applies a guarded status transition.
    ///
    /// If the stored status matches `expected` the update is applied
    /// (setting `completed_at` on first entry into a terminal state) and
    /// `Applied` is returned. If the stored status is already terminal the
    /// call is absorbed and `AlreadySettled` is returned. Any other
    /// mismatch is a `StatusConflict` error; an `expected -> update.to`
    /// pair outside the state machine is an `IllegalTransition` error.
    async fn transition(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        update: TransitionUpdate,
    ) -> Result<TransitionOutcome>;

    /// Persists a new refund row.
    ///
    /// Enforces, atomically with the insert, that the pending-plus-
    /// succeeded refund total never exceeds the transaction amount.
    async fn insert_refund(&self, refund: &Refund) -> Result<()>;

    /// Fetches a refund by id.
    async fn get_refund(&self, id: RefundId) -> Result<Option<Refund>>;

    /// Lists refunds for a transaction, oldest first.
    async fn refunds_for_transaction(&self, id: TransactionId) -> Result<Vec<Refund>>;

    /// Updates a refund's status and provider reference.
    async fn set_refund_status(
        &self,
        id: RefundId,
        status: RefundStatus,
        provider_reference: Option<&str>,
    ) -> Result<()>;

    /// Sum of succeeded refund amounts for a transaction.
    async fn refunded_total(&self, id: TransactionId) -> Result<Money>;

    /// Sum of pending and succeeded refund amounts for a transaction.
    /// Pending refunds count against the refundable remainder so that two
    /// in-flight refunds cannot overshoot together.
    async fn reserved_refund_total(&self, id: TransactionId) -> Result<Money>;
}
