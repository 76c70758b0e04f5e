use async_trait::async_trait;
use common::WebhookEventId;

use crate::error::Result;
use crate::event::WebhookEvent;

/// Result of an insert-or-ignore attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// First delivery of this `(provider, provider_event_id)` pair.
    Inserted,
    /// A row with the same key already exists; nothing was written.
    Duplicate,
}

/// Persistence for inbound webhook deliveries.
///
/// Deduplication is atomic with the insert: concurrent deliveries of the
/// same event race on the unique key, and exactly one caller sees
/// `Inserted`. Processing is single-flight per event via the
/// claim/finish/release triple.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Inserts the event unless its `(provider, provider_event_id)` key
    /// already exists.
    async fn insert_if_new(&self, event: &WebhookEvent) -> Result<InsertOutcome>;

    /// Fetches an event by id.
    async fn get(&self, id: WebhookEventId) -> Result<Option<WebhookEvent>>;

    /// Takes the exclusive processing claim for an event. Returns false if
    /// the event is already claimed or already processed.
    async fn try_claim(&self, id: WebhookEventId) -> Result<bool>;

    /// Marks the event processed (terminally), recording whether the
    /// signature verified and any handler error, and drops the claim.
    async fn mark_processed(
        &self,
        id: WebhookEventId,
        signature_verified: bool,
        error: Option<&str>,
    ) -> Result<()>;

    /// Drops the processing claim without marking the event processed, so
    /// a later retry can claim it again.
    async fn release(&self, id: WebhookEventId) -> Result<()>;

    /// Releases claims held longer than `max_age` on unprocessed events.
    /// A worker that dies between claim and finish leaves its claim behind;
    /// this makes the event claimable again. Returns the number released.
    async fn release_stale(&self, max_age: chrono::Duration) -> Result<u64>;

    /// Number of stored events not yet processed.
    async fn count_unprocessed(&self) -> Result<i64>;
}
