//! Shared types for the payment core.
//!
//! Newtype identifiers keep the many UUID-keyed entities (transactions,
//! refunds, jobs, webhook events) from being mixed up at compile time,
//! and [`Money`] keeps amounts in integer minor units.

pub mod ids;
pub mod money;

pub use ids::{JobId, RefundId, TransactionId, UserId, WebhookEventId};
pub use money::Money;
