//! Transaction and refund entities.

use chrono::{DateTime, Utc};
use common::{Money, RefundId, TransactionId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{CaptureMode, RefundStatus, TransactionStatus};

/// Polymorphic reference to the domain record a transaction pays for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    /// Name of the target type as registered in the catalog.
    pub target_type: String,
    /// Identifier of the domain record.
    pub target_id: Uuid,
}

impl TargetRef {
    pub fn new(target_type: impl Into<String>, target_id: Uuid) -> Self {
        Self {
            target_type: target_type.into(),
            target_id,
        }
    }
}

impl std::fmt::Display for TargetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.target_type, self.target_id)
    }
}

/// A payment transaction.
///
/// Rows are never deleted and terminal rows are never mutated (refund
/// bookkeeping lives on separate [`Refund`] rows). A user-visible retry
/// creates a new row; old rows remain as the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub owner_id: UserId,
    pub target: TargetRef,
    pub amount: Money,
    pub currency: String,
    pub status: TransactionStatus,
    pub capture_mode: CaptureMode,
    /// Opaque reference assigned by the provider once the intent exists.
    pub provider_reference: Option<String>,
    /// Secret the owner needs to complete the external interaction.
    /// Never exposed to anyone but the original owner.
    pub provider_secret: Option<String>,
    pub description: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set exactly once, on the first transition into a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Creates a new transaction in `PendingIntent` state.
    pub fn new(
        owner_id: UserId,
        target: TargetRef,
        amount: Money,
        currency: impl Into<String>,
        capture_mode: CaptureMode,
        description: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            owner_id,
            target,
            amount,
            currency: currency.into(),
            status: TransactionStatus::PendingIntent,
            capture_mode,
            provider_reference: None,
            provider_secret: None,
            description,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Returns true if the transaction has settled.
    pub fn is_settled(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A refund against a succeeded transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub id: RefundId,
    pub transaction_id: TransactionId,
    pub amount: Money,
    pub status: RefundStatus,
    pub reason: Option<String>,
    pub provider_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Refund {
    /// Creates a new pending refund.
    pub fn new(transaction_id: TransactionId, amount: Money, reason: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RefundId::new(),
            transaction_id,
            amount,
            status: RefundStatus::Pending,
            reason,
            provider_reference: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction_starts_pending_intent() {
        let tx = Transaction::new(
            UserId::new(),
            TargetRef::new("invoice", Uuid::new_v4()),
            Money::from_cents(5000),
            "usd",
            CaptureMode::Immediate,
            None,
        );

        assert_eq!(tx.status, TransactionStatus::PendingIntent);
        assert!(tx.provider_reference.is_none());
        assert!(tx.provider_secret.is_none());
        assert!(tx.completed_at.is_none());
        assert!(!tx.is_settled());
    }

    #[test]
    fn test_new_refund_starts_pending() {
        let refund = Refund::new(TransactionId::new(), Money::from_cents(1000), None);
        assert_eq!(refund.status, RefundStatus::Pending);
        assert!(refund.provider_reference.is_none());
    }

    #[test]
    fn test_target_ref_display() {
        let id = Uuid::new_v4();
        let target = TargetRef::new("membership", id);
        assert_eq!(target.to_string(), format!("membership/{id}"));
    }
}
