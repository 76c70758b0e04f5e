//! Background execution: the worker pool and every job handler.
//!
//! Handlers are the only place provider calls happen. Each handler is
//! idempotent against replays (a reclaimed job reloads current state and
//! no-ops if the work is already done), and each classifies provider
//! failures: transient errors bubble up so the job store retries with
//! backoff, permanent errors settle the affected row and complete the
//! job.

pub mod error;
pub mod handlers;
pub mod notify;
pub mod pool;
pub mod provider;

pub use error::{Result, WorkerError};
pub use handlers::{HandlerSet, JobHandler};
pub use notify::{InMemoryNotificationChannel, Notification, NotificationChannel};
pub use pool::{PoolConfig, WorkerPool};
pub use provider::{InMemoryPaymentProvider, IntentCreated, PaymentProvider, ProviderError};
