//! Event-type dispatch for webhook processing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::event::WebhookEvent;

pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Applies one webhook event type to the domain.
///
/// Handlers run under the event's exclusive processing claim and must be
/// idempotent: a transient failure releases the claim and the job retries
/// the whole event.
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    async fn handle(&self, event: &WebhookEvent) -> HandlerResult;
}

/// Maps event type names to handlers. Populated at startup.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn WebhookHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        event_type: impl Into<String>,
        handler: Arc<dyn WebhookHandler>,
    ) -> Self {
        self.handlers.insert(event_type.into(), handler);
        self
    }

    /// Looks up the handler for an event type. Unregistered types are not
    /// errors; the caller logs and marks the event processed.
    pub fn handler_for(&self, event_type: &str) -> Option<&Arc<dyn WebhookHandler>> {
        self.handlers.get(event_type)
    }

    pub fn registered_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::event::Envelope;

    struct CountingHandler {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl WebhookHandler for CountingHandler {
        async fn handle(&self, _event: &WebhookEvent) -> HandlerResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_event_type() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = HandlerRegistry::new().register(
            "payment.succeeded",
            Arc::new(CountingHandler {
                calls: calls.clone(),
            }),
        );

        let body = br#"{"id":"evt_1","type":"payment.succeeded"}"#;
        let envelope = Envelope::parse(body).unwrap();
        let event = WebhookEvent::new("stripe", &envelope, body.to_vec(), "sig");

        let handler = registry.handler_for(&event.event_type).unwrap();
        handler.handle(&event).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(registry.handler_for("payment.unknown").is_none());
    }
}
