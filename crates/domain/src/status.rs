//! Transaction and refund status state machines.

use common::Money;
use serde::{Deserialize, Serialize};

/// The stored status of a transaction.
///
/// State transitions:
/// ```text
/// PendingIntent ──► Pending ──┬──► Succeeded
///       │                     ├──► Failed
///       └──► Failed           └──► Canceled
/// ```
///
/// `PendingIntent → Pending`/`Failed` is driven by the intent-creation job;
/// everything out of `Pending` is driven only by verified webhook events.
/// Refund standing is derived separately, see [`EffectiveStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Created locally; the provider intent does not exist yet.
    #[default]
    PendingIntent,

    /// Intent created at the provider, awaiting the outcome callback.
    Pending,

    /// Funds confirmed by the provider (terminal state).
    Succeeded,

    /// Intent creation failed or the provider reported failure (terminal state).
    Failed,

    /// Canceled before completion (terminal state).
    Canceled,
}

impl TransactionStatus {
    /// Returns true if this is a terminal state. Terminal rows are immutable
    /// except for refund bookkeeping.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Succeeded | TransactionStatus::Failed | TransactionStatus::Canceled
        )
    }

    /// Returns true if the transition to `next` is legal.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (
                TransactionStatus::PendingIntent,
                TransactionStatus::Pending | TransactionStatus::Failed
            ) | (
                TransactionStatus::Pending,
                TransactionStatus::Succeeded
                    | TransactionStatus::Failed
                    | TransactionStatus::Canceled
            )
        )
    }

    /// Returns true if a follow-up transaction may be created for the same
    /// target. While a transaction is in flight the existing row is resumed
    /// instead.
    pub fn allows_retry(&self) -> bool {
        matches!(self, TransactionStatus::Failed | TransactionStatus::Canceled)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::PendingIntent => "pending_intent",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Succeeded => "succeeded",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Canceled => "canceled",
        }
    }

    /// Parses a status from its string name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_intent" => Some(TransactionStatus::PendingIntent),
            "pending" => Some(TransactionStatus::Pending),
            "succeeded" => Some(TransactionStatus::Succeeded),
            "failed" => Some(TransactionStatus::Failed),
            "canceled" => Some(TransactionStatus::Canceled),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The status of a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Succeeded => "succeeded",
            RefundStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RefundStatus::Pending),
            "succeeded" => Some(RefundStatus::Succeeded),
            "failed" => Some(RefundStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// When funds are captured relative to intent creation.
///
/// Fixed at transaction creation from the target type's catalog policy and
/// never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Funds are captured as soon as the intent confirms.
    #[default]
    Immediate,

    /// Funds are reserved at intent time and captured later by an explicit
    /// capture call triggered by a domain event.
    Deferred,
}

impl CaptureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMode::Immediate => "immediate",
            CaptureMode::Deferred => "deferred",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "immediate" => Some(CaptureMode::Immediate),
            "deferred" => Some(CaptureMode::Deferred),
            _ => None,
        }
    }
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The user-visible status of a transaction with refund standing folded in.
///
/// Refund standing is computed from the refund rows, never stored
/// redundantly on the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveStatus {
    PendingIntent,
    Pending,
    Succeeded,
    Failed,
    Canceled,
    PartiallyRefunded,
    Refunded,
}

impl EffectiveStatus {
    /// Computes the effective status from the stored status, the sum of
    /// succeeded refunds, and the transaction amount.
    pub fn compute(status: TransactionStatus, refunded: Money, amount: Money) -> Self {
        if status == TransactionStatus::Succeeded && refunded.is_positive() {
            if refunded >= amount {
                return EffectiveStatus::Refunded;
            }
            return EffectiveStatus::PartiallyRefunded;
        }
        match status {
            TransactionStatus::PendingIntent => EffectiveStatus::PendingIntent,
            TransactionStatus::Pending => EffectiveStatus::Pending,
            TransactionStatus::Succeeded => EffectiveStatus::Succeeded,
            TransactionStatus::Failed => EffectiveStatus::Failed,
            TransactionStatus::Canceled => EffectiveStatus::Canceled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveStatus::PendingIntent => "pending_intent",
            EffectiveStatus::Pending => "pending",
            EffectiveStatus::Succeeded => "succeeded",
            EffectiveStatus::Failed => "failed",
            EffectiveStatus::Canceled => "canceled",
            EffectiveStatus::PartiallyRefunded => "partially_refunded",
            EffectiveStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for EffectiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
