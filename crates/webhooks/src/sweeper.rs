//! Background reaper for abandoned processing claims.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::store::WebhookStore;

/// Spawns a task that periodically releases processing claims older than
/// `max_claim_age`, so events orphaned by a crashed worker become
/// claimable again. Stops when `shutdown` flips to true.
pub fn spawn_claim_sweeper<W>(
    store: W,
    every: Duration,
    max_claim_age: chrono::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    W: WebhookStore + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                () = tokio::time::sleep(every) => {
                    match store.release_stale(max_claim_age).await {
                        Ok(0) => {}
                        Ok(released) => {
                            info!(released, "released stale webhook processing claims");
                            metrics::counter!("webhook_claims_released_total")
                                .increment(released);
                        }
                        Err(err) => {
                            warn!(error = %err, "stale claim sweep failed");
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Envelope;
    use crate::event::WebhookEvent;
    use crate::memory::InMemoryWebhookStore;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sweeper_frees_abandoned_claim() {
        let store = InMemoryWebhookStore::new();
        let body = br#"{"id":"evt_1","type":"payment.succeeded"}"#.to_vec();
        let envelope = Envelope::parse(&body).unwrap();
        let event = WebhookEvent::new("stripe", &envelope, body, "sig");
        store.insert_if_new(&event).await.unwrap();

        // A worker claims the event and then disappears without finishing.
        assert!(store.try_claim(event.id).await.unwrap());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_claim_sweeper(
            store.clone(),
            Duration::from_millis(10),
            chrono::Duration::milliseconds(20),
            shutdown_rx,
        );

        let mut reclaimed = false;
        for _ in 0..300 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if store.try_claim(event.id).await.unwrap() {
                reclaimed = true;
                break;
            }
        }
        assert!(reclaimed, "stale claim was never released");

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
