//! Job dispatch: the handler trait and the kind registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use job_store::Job;

use crate::error::Result;

pub mod followup;
pub mod intent;
pub mod refund;
pub mod webhook;

pub use followup::{NotifyHandler, SyncTargetHandler};
pub use intent::{CancelIntentHandler, CaptureIntentHandler, CreateIntentHandler};
pub use refund::CreateRefundHandler;
pub use webhook::{
    ProcessWebhookHandler, RefundSettlementHandler, SettlementHandler, settlement_registry,
};

/// Executes one kind of background job.
///
/// A returned error means the attempt failed and the job store decides
/// between backoff retry and dead-letter; handlers that hit permanent
/// provider failures settle the affected row themselves and return Ok.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &Job) -> Result<()>;
}

/// Registry mapping job kinds to handlers. Populated at startup.
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: impl Into<String>, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(kind.into(), handler);
        self
    }

    pub fn handler_for(&self, kind: &str) -> Option<&Arc<dyn JobHandler>> {
        self.handlers.get(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}
