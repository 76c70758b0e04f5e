//! In-memory webhook store for tests and local development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::WebhookEventId;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::event::WebhookEvent;
use crate::store::{InsertOutcome, WebhookStore};

#[derive(Default)]
struct Inner {
    events: HashMap<WebhookEventId, WebhookEvent>,
    /// Mirrors the unique key constraint: (provider, provider_event_id).
    seen: HashMap<(String, String), WebhookEventId>,
    /// Active processing claims with the time they were taken.
    claimed: HashMap<WebhookEventId, DateTime<Utc>>,
}

/// In-memory implementation of [`WebhookStore`].
#[derive(Clone, Default)]
pub struct InMemoryWebhookStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events.
    pub async fn event_count(&self) -> usize {
        self.inner.read().await.events.len()
    }

    /// Removes all events. For test setup.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.events.clear();
        inner.seen.clear();
        inner.claimed.clear();
    }
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn insert_if_new(&self, event: &WebhookEvent) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().await;
        let key = (event.provider.clone(), event.provider_event_id.clone());
        if inner.seen.contains_key(&key) {
            return Ok(InsertOutcome::Duplicate);
        }
        inner.seen.insert(key, event.id);
        inner.events.insert(event.id, event.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, id: WebhookEventId) -> Result<Option<WebhookEvent>> {
        Ok(self.inner.read().await.events.get(&id).cloned())
    }

    async fn try_claim(&self, id: WebhookEventId) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let processed = match inner.events.get(&id) {
            Some(event) => event.processed,
            None => return Ok(false),
        };
        if processed || inner.claimed.contains_key(&id) {
            return Ok(false);
        }
        inner.claimed.insert(id, Utc::now());
        Ok(true)
    }

    async fn mark_processed(
        &self,
        id: WebhookEventId,
        signature_verified: bool,
        error: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(event) = inner.events.get_mut(&id) {
            event.processed = true;
            event.signature_verified = signature_verified;
            event.error = error.map(str::to_string);
        }
        inner.claimed.remove(&id);
        Ok(())
    }

    async fn release(&self, id: WebhookEventId) -> Result<()> {
        self.inner.write().await.claimed.remove(&id);
        Ok(())
    }

    async fn release_stale(&self, max_age: chrono::Duration) -> Result<u64> {
        let cutoff = Utc::now() - max_age;
        let mut inner = self.inner.write().await;
        let before = inner.claimed.len();
        inner.claimed.retain(|_, taken_at| *taken_at >= cutoff);
        Ok((before - inner.claimed.len()) as u64)
    }

    async fn count_unprocessed(&self) -> Result<i64> {
        let inner = self.inner.read().await;
        Ok(inner.events.values().filter(|e| !e.processed).count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Envelope;

    fn event(provider: &str, event_id: &str) -> WebhookEvent {
        let body = format!(r#"{{"id":"{event_id}","type":"payment.succeeded"}}"#);
        let envelope = Envelope::parse(body.as_bytes()).unwrap();
        WebhookEvent::new(provider, &envelope, body.into_bytes(), "sig")
    }

    #[tokio::test]
    async fn test_duplicate_key_is_ignored() {
        let store = InMemoryWebhookStore::new();
        let first = event("stripe", "evt_1");
        let redelivery = event("stripe", "evt_1");

        assert_eq!(
            store.insert_if_new(&first).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert_if_new(&redelivery).await.unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(store.event_count().await, 1);
        // The surviving row is the first delivery.
        assert!(store.get(first.id).await.unwrap().is_some());
        assert!(store.get(redelivery.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_event_id_different_providers_both_insert() {
        let store = InMemoryWebhookStore::new();
        assert_eq!(
            store.insert_if_new(&event("stripe", "evt_1")).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert_if_new(&event("adyen", "evt_1")).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(store.event_count().await, 2);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_until_released() {
        let store = InMemoryWebhookStore::new();
        let e = event("stripe", "evt_1");
        store.insert_if_new(&e).await.unwrap();

        assert!(store.try_claim(e.id).await.unwrap());
        assert!(!store.try_claim(e.id).await.unwrap());

        store.release(e.id).await.unwrap();
        assert!(store.try_claim(e.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_processed_event_cannot_be_reclaimed() {
        let store = InMemoryWebhookStore::new();
        let e = event("stripe", "evt_1");
        store.insert_if_new(&e).await.unwrap();

        assert!(store.try_claim(e.id).await.unwrap());
        store.mark_processed(e.id, true, None).await.unwrap();

        assert!(!store.try_claim(e.id).await.unwrap());
        let stored = store.get(e.id).await.unwrap().unwrap();
        assert!(stored.processed);
        assert!(stored.signature_verified);
        assert_eq!(store.count_unprocessed().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stale_claim_is_released_for_reprocessing() {
        let store = InMemoryWebhookStore::new();
        let e = event("stripe", "evt_1");
        store.insert_if_new(&e).await.unwrap();
        assert!(store.try_claim(e.id).await.unwrap());

        // A claim younger than the age bound is left alone.
        assert_eq!(
            store.release_stale(chrono::Duration::hours(1)).await.unwrap(),
            0
        );
        assert!(!store.try_claim(e.id).await.unwrap());

        // Once it outlives the bound the claim is dropped and the event is
        // claimable again, as if the dead worker had released it.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(
            store
                .release_stale(chrono::Duration::milliseconds(10))
                .await
                .unwrap(),
            1
        );
        assert!(store.try_claim(e.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_processed_records_error() {
        let store = InMemoryWebhookStore::new();
        let e = event("stripe", "evt_1");
        store.insert_if_new(&e).await.unwrap();
        store
            .mark_processed(e.id, false, Some("bad signature"))
            .await
            .unwrap();

        let stored = store.get(e.id).await.unwrap().unwrap();
        assert_eq!(stored.error.as_deref(), Some("bad signature"));
        assert!(!stored.signature_verified);
    }
}
