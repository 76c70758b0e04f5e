//! The ingest path: persist first, work later.

use common::WebhookEventId;
use domain::jobs::{ProcessWebhookArgs, KIND_PROCESS_WEBHOOK, QUEUE_WEBHOOKS};
use job_store::{JobStore, NewJob};
use tracing::info;

use crate::error::Result;
use crate::event::{Envelope, WebhookEvent};
use crate::store::{InsertOutcome, WebhookStore};

/// Outcome of an accepted delivery. Both variants mean the sender gets a
/// success acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First delivery; a processing job was enqueued.
    Accepted(WebhookEventId),
    /// Redelivery of an already stored event; no new work.
    Duplicate,
}

/// Receives raw webhook deliveries and makes them durable.
///
/// Only the envelope (event id and type) is parsed here. No signature
/// verification, no business logic: once the row exists the delivery is
/// acknowledged and everything else happens in the worker, where failures
/// can retry without asking the provider to resend.
#[derive(Clone)]
pub struct Ingestor<W, J>
where
    W: WebhookStore,
    J: JobStore,
{
    store: W,
    job_store: J,
}

impl<W, J> Ingestor<W, J>
where
    W: WebhookStore,
    J: JobStore,
{
    pub fn new(store: W, job_store: J) -> Self {
        Self { store, job_store }
    }

    /// Ingests one raw delivery.
    ///
    /// An unparseable envelope is the only error path: it cannot be
    /// deduplicated, so it is rejected and the provider will retry.
    /// Everything after the durable insert succeeds from the sender's
    /// point of view.
    #[tracing::instrument(skip(self, raw_body, signature_header))]
    pub async fn ingest(
        &self,
        provider: &str,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<IngestOutcome> {
        metrics::counter!("webhooks_received_total", "provider" => provider.to_string())
            .increment(1);

        let envelope = Envelope::parse(raw_body)?;
        let event = WebhookEvent::new(provider, &envelope, raw_body.to_vec(), signature_header);

        match self.store.insert_if_new(&event).await? {
            InsertOutcome::Duplicate => {
                metrics::counter!("webhooks_deduplicated_total").increment(1);
                info!(
                    provider_event_id = %envelope.id,
                    "duplicate webhook delivery acknowledged"
                );
                Ok(IngestOutcome::Duplicate)
            }
            InsertOutcome::Inserted => {
                self.job_store
                    .enqueue(
                        NewJob::new(
                            KIND_PROCESS_WEBHOOK,
                            serde_json::to_value(ProcessWebhookArgs { event_id: event.id })?,
                        )
                        .on_queue(QUEUE_WEBHOOKS),
                    )
                    .await?;
                info!(
                    event_id = %event.id,
                    provider_event_id = %envelope.id,
                    event_type = %envelope.event_type,
                    "webhook stored and queued"
                );
                Ok(IngestOutcome::Accepted(event.id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use job_store::InMemoryJobStore;

    use super::*;
    use crate::error::WebhookError;
    use crate::memory::InMemoryWebhookStore;

    fn ingestor() -> (
        Ingestor<InMemoryWebhookStore, InMemoryJobStore>,
        InMemoryWebhookStore,
        InMemoryJobStore,
    ) {
        let store = InMemoryWebhookStore::new();
        let jobs = InMemoryJobStore::new();
        (Ingestor::new(store.clone(), jobs.clone()), store, jobs)
    }

    #[tokio::test]
    async fn test_first_delivery_stores_and_queues() {
        let (ingestor, store, jobs) = ingestor();
        let body = br#"{"id":"evt_1","type":"payment.succeeded"}"#;

        let outcome = ingestor.ingest("stripe", body, "sig").await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Accepted(_)));
        assert_eq!(store.event_count().await, 1);
        assert_eq!(jobs.jobs_of_kind(KIND_PROCESS_WEBHOOK).await.len(), 1);
    }

    #[tokio::test]
    async fn test_redelivery_acknowledged_without_new_work() {
        let (ingestor, store, jobs) = ingestor();
        let body = br#"{"id":"evt_1","type":"payment.succeeded"}"#;

        ingestor.ingest("stripe", body, "sig").await.unwrap();
        let second = ingestor.ingest("stripe", body, "sig").await.unwrap();

        assert_eq!(second, IngestOutcome::Duplicate);
        assert_eq!(store.event_count().await, 1);
        assert_eq!(jobs.jobs_of_kind(KIND_PROCESS_WEBHOOK).await.len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_body_is_rejected() {
        let (ingestor, store, jobs) = ingestor();
        let err = ingestor.ingest("stripe", b"<xml/>", "sig").await.unwrap_err();

        assert!(matches!(err, WebhookError::InvalidEnvelope(_)));
        assert_eq!(store.event_count().await, 0);
        assert_eq!(jobs.job_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_store_one_row() {
        let (ingestor, store, jobs) = ingestor();
        let body = br#"{"id":"evt_race","type":"payment.succeeded"}"#.to_vec();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ingestor = ingestor.clone();
            let body = body.clone();
            handles.push(tokio::spawn(async move {
                ingestor.ingest("stripe", &body, "sig").await.unwrap()
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), IngestOutcome::Accepted(_)) {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(store.event_count().await, 1);
        assert_eq!(jobs.jobs_of_kind(KIND_PROCESS_WEBHOOK).await.len(), 1);
    }
}
