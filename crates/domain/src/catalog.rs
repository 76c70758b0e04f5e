//! Registry of payable target types.
//!
//! The catalog is the narrow interface to the surrounding system's schema
//! layer: it declares which domain-record types can be paid for, which
//! capture policy applies, and how to push a payment status back onto a
//! record. Populated once at startup and treated as immutable afterwards;
//! dispatch is by registered name, never by runtime-built statements.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::TransactionId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{DomainError, Result};
use crate::status::{CaptureMode, TransactionStatus};

/// Payment status written onto the linked domain record when a transaction
/// settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPaymentStatus {
    Paid,
    PaymentFailed,
    PaymentCanceled,
}

impl TargetPaymentStatus {
    /// Derives the record-level status from a terminal transaction status.
    /// Returns None for non-terminal statuses, which have no record-level
    /// representation.
    pub fn from_transaction_status(status: TransactionStatus) -> Option<Self> {
        match status {
            TransactionStatus::Succeeded => Some(TargetPaymentStatus::Paid),
            TransactionStatus::Failed => Some(TargetPaymentStatus::PaymentFailed),
            TransactionStatus::Canceled => Some(TargetPaymentStatus::PaymentCanceled),
            TransactionStatus::PendingIntent | TransactionStatus::Pending => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetPaymentStatus::Paid => "paid",
            TargetPaymentStatus::PaymentFailed => "payment_failed",
            TargetPaymentStatus::PaymentCanceled => "payment_canceled",
        }
    }
}

impl std::fmt::Display for TargetPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Write-side hook for a registered target type.
///
/// Implementations must be idempotent: the sync job runs at least once and
/// may run more than once for the same transition.
#[async_trait]
pub trait TargetSink: Send + Sync {
    /// Applies a payment status to the given record, repointing its
    /// current-transaction reference at the same time.
    async fn apply_payment_status(
        &self,
        target_id: Uuid,
        transaction_id: TransactionId,
        status: TargetPaymentStatus,
    ) -> Result<()>;
}

/// Catalog entry for one payable target type.
#[derive(Clone)]
pub struct TargetBinding {
    /// Capture policy stamped onto transactions for this target type.
    pub capture_mode: CaptureMode,
    sink: Arc<dyn TargetSink>,
}

impl TargetBinding {
    pub fn new(capture_mode: CaptureMode, sink: Arc<dyn TargetSink>) -> Self {
        Self { capture_mode, sink }
    }

    pub fn sink(&self) -> &Arc<dyn TargetSink> {
        &self.sink
    }
}

/// Immutable registry mapping target type names to their bindings.
#[derive(Clone, Default)]
pub struct TargetCatalog {
    bindings: HashMap<String, TargetBinding>,
}

impl TargetCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a target type. Intended for startup wiring only.
    pub fn register(mut self, target_type: impl Into<String>, binding: TargetBinding) -> Self {
        self.bindings.insert(target_type.into(), binding);
        self
    }

    /// Looks up the binding for a target type.
    pub fn binding(&self, target_type: &str) -> Result<&TargetBinding> {
        self.bindings
            .get(target_type)
            .ok_or_else(|| DomainError::UnknownTarget(target_type.to_string()))
    }

    /// Returns the capture policy for a target type.
    pub fn capture_mode(&self, target_type: &str) -> Result<CaptureMode> {
        Ok(self.binding(target_type)?.capture_mode)
    }

    /// Returns true if the target type is registered as payable.
    pub fn is_registered(&self, target_type: &str) -> bool {
        self.bindings.contains_key(target_type)
    }
}

/// In-memory sink that records applied statuses, for testing.
///
/// Writes are keyed by target id, so reapplying the same status is
/// naturally idempotent.
#[derive(Clone, Default)]
pub struct RecordingTargetSink {
    applied: Arc<RwLock<HashMap<Uuid, (TransactionId, TargetPaymentStatus)>>>,
    apply_count: Arc<RwLock<u64>>,
}

impl RecordingTargetSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded status for a target, if any.
    pub async fn status_of(&self, target_id: Uuid) -> Option<(TransactionId, TargetPaymentStatus)> {
        self.applied.read().await.get(&target_id).copied()
    }

    /// Returns the total number of apply calls (including repeats).
    pub async fn apply_count(&self) -> u64 {
        *self.apply_count.read().await
    }
}

#[async_trait]
impl TargetSink for RecordingTargetSink {
    async fn apply_payment_status(
        &self,
        target_id: Uuid,
        transaction_id: TransactionId,
        status: TargetPaymentStatus,
    ) -> Result<()> {
        self.applied
            .write()
            .await
            .insert(target_id, (transaction_id, status));
        *self.apply_count.write().await += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with_invoice() -> (TargetCatalog, Arc<RecordingTargetSink>) {
        let sink = Arc::new(RecordingTargetSink::new());
        let catalog = TargetCatalog::new().register(
            "invoice",
            TargetBinding::new(CaptureMode::Immediate, sink.clone()),
        );
        (catalog, sink)
    }

    #[test]
    fn test_unknown_target_is_an_error() {
        let (catalog, _) = catalog_with_invoice();
        assert!(catalog.is_registered("invoice"));
        assert!(!catalog.is_registered("subscription"));
        assert!(matches!(
            catalog.binding("subscription"),
            Err(DomainError::UnknownTarget(_))
        ));
    }

    #[test]
    fn test_capture_mode_lookup() {
        let sink = Arc::new(RecordingTargetSink::new());
        let catalog = TargetCatalog::new()
            .register(
                "invoice",
                TargetBinding::new(CaptureMode::Immediate, sink.clone()),
            )
            .register(
                "booking",
                TargetBinding::new(CaptureMode::Deferred, sink),
            );

        assert_eq!(
            catalog.capture_mode("invoice").unwrap(),
            CaptureMode::Immediate
        );
        assert_eq!(
            catalog.capture_mode("booking").unwrap(),
            CaptureMode::Deferred
        );
    }

    #[test]
    fn test_status_derivation_from_terminal_states() {
        assert_eq!(
            TargetPaymentStatus::from_transaction_status(TransactionStatus::Succeeded),
            Some(TargetPaymentStatus::Paid)
        );
        assert_eq!(
            TargetPaymentStatus::from_transaction_status(TransactionStatus::Failed),
            Some(TargetPaymentStatus::PaymentFailed)
        );
        assert_eq!(
            TargetPaymentStatus::from_transaction_status(TransactionStatus::Canceled),
            Some(TargetPaymentStatus::PaymentCanceled)
        );
        assert_eq!(
            TargetPaymentStatus::from_transaction_status(TransactionStatus::Pending),
            None
        );
    }

    #[tokio::test]
    async fn test_recording_sink_is_idempotent_per_target() {
        let (catalog, sink) = catalog_with_invoice();
        let target_id = Uuid::new_v4();
        let tx_id = TransactionId::new();

        let binding = catalog.binding("invoice").unwrap();
        for _ in 0..2 {
            binding
                .sink()
                .apply_payment_status(target_id, tx_id, TargetPaymentStatus::Paid)
                .await
                .unwrap();
        }

        assert_eq!(
            sink.status_of(target_id).await,
            Some((tx_id, TargetPaymentStatus::Paid))
        );
        assert_eq!(sink.apply_count().await, 2);
    }
}
