//! Domain layer for the payment core.
//!
//! This crate owns the `Transaction` and `Refund` entities and is the only
//! place transaction status is mutated. Every status change goes through a
//! compare-and-swap guarded [`TransactionStore::transition`], so duplicate
//! or late-arriving events against settled transactions are no-ops rather
//! than corruption.

pub mod catalog;
pub mod error;
pub mod jobs;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod service;
pub mod status;
pub mod store;

pub use catalog::{RecordingTargetSink, TargetBinding, TargetCatalog, TargetPaymentStatus, TargetSink};
pub use common::{Money, RefundId, TransactionId, UserId};
pub use error::{DomainError, Result};
pub use memory::InMemoryTransactionStore;
pub use model::{Refund, TargetRef, Transaction};
pub use postgres::PostgresTransactionStore;
pub use service::{CheckoutReady, ServiceConfig, TransactionService, WebhookOutcome};
pub use status::{CaptureMode, EffectiveStatus, RefundStatus, TransactionStatus};
pub use store::{TransactionStore, TransitionOutcome, TransitionUpdate};
