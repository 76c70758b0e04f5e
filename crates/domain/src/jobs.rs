//! Job vocabulary shared by the enqueueing services and the worker pool.
//!
//! Every background job kind has a constant name and a typed argument
//! struct serialized into the job's args column. Arguments carry ids only;
//! handlers reload current state from the stores so that a stale payload
//! can never overwrite fresher data.

use common::{RefundId, TransactionId, UserId, WebhookEventId};
use serde::{Deserialize, Serialize};

use crate::catalog::TargetPaymentStatus;

pub const KIND_CREATE_INTENT: &str = "create_intent";
pub const KIND_CAPTURE_INTENT: &str = "capture_intent";
pub const KIND_CANCEL_INTENT: &str = "cancel_intent";
pub const KIND_CREATE_REFUND: &str = "create_refund";
pub const KIND_PROCESS_WEBHOOK: &str = "process_webhook";
pub const KIND_SYNC_TARGET: &str = "sync_target";
pub const KIND_NOTIFY: &str = "notify";

/// Queue for provider-facing calls.
pub const QUEUE_PROVIDER: &str = "provider";
/// Queue for webhook event processing.
pub const QUEUE_WEBHOOKS: &str = "webhooks";
/// Queue for internal follow-up work (record sync, notifications).
pub const QUEUE_INTERNAL: &str = "internal";

/// Args for [`KIND_CREATE_INTENT`]: register a payment intent with the
/// provider for a transaction in `pending_intent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIntentArgs {
    pub transaction_id: TransactionId,
}

/// Args for [`KIND_CAPTURE_INTENT`]: capture a previously authorized
/// deferred-capture intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureIntentArgs {
    pub transaction_id: TransactionId,
}

/// Args for [`KIND_CANCEL_INTENT`]: void an intent before settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelIntentArgs {
    pub transaction_id: TransactionId,
}

/// Args for [`KIND_CREATE_REFUND`]: submit a pending refund to the
/// provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRefundArgs {
    pub refund_id: RefundId,
}

/// Args for [`KIND_PROCESS_WEBHOOK`]: verify and apply a durably stored
/// webhook event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessWebhookArgs {
    pub event_id: WebhookEventId,
}

/// Args for [`KIND_SYNC_TARGET`]: push a settled transaction's status onto
/// its linked record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTargetArgs {
    pub transaction_id: TransactionId,
}

/// Args for [`KIND_NOTIFY`]: tell the owning user how their payment ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyArgs {
    pub user_id: UserId,
    pub transaction_id: TransactionId,
    pub outcome: TargetPaymentStatus,
}
