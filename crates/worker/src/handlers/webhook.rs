//! Webhook processing: signature verification, event-type dispatch, and
//! the settlement handlers.

use async_trait::async_trait;
use common::RefundId;
use domain::jobs::ProcessWebhookArgs;
use domain::{RefundStatus, TransactionService, TransactionStatus, TransactionStore, WebhookOutcome};
use job_store::{Job, JobStore};
use serde::Deserialize;
use tracing::{debug, info, warn};
use webhooks::{HandlerRegistry, HandlerResult, WebhookEvent, WebhookHandler, WebhookStore};

use crate::error::{Result, WorkerError};
use crate::handlers::JobHandler;
use crate::provider::PaymentProvider;

/// The portion of a provider event body the settlement handlers read.
#[derive(Debug, Deserialize)]
struct EventPayload {
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: EventObject,
}

#[derive(Debug, Deserialize)]
struct EventObject {
    /// Provider reference of the intent or refund the event concerns.
    id: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    metadata: EventMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct EventMetadata {
    refund_id: Option<RefundId>,
}

fn parse_payload(event: &WebhookEvent) -> std::result::Result<EventPayload, String> {
    serde_json::from_slice(&event.payload)
        .map_err(|e| format!("malformed event payload: {e}"))
}

/// Applies a payment settlement event to the transaction it references.
pub struct SettlementHandler<S, J>
where
    S: TransactionStore + Clone,
    J: JobStore + Clone,
{
    service: TransactionService<S, J>,
    status: TransactionStatus,
}

impl<S, J> SettlementHandler<S, J>
where
    S: TransactionStore + Clone,
    J: JobStore + Clone,
{
    pub fn new(service: TransactionService<S, J>, status: TransactionStatus) -> Self {
        Self { service, status }
    }
}

#[async_trait]
impl<S, J> WebhookHandler for SettlementHandler<S, J>
where
    S: TransactionStore + Clone + Send + Sync,
    J: JobStore + Clone + Send + Sync,
{
    async fn handle(&self, event: &WebhookEvent) -> HandlerResult {
        let payload = parse_payload(event)?;
        let outcome = self
            .service
            .settle_from_webhook(
                &payload.data.object.id,
                self.status,
                payload.data.object.error.as_deref(),
            )
            .await?;
        if matches!(outcome, WebhookOutcome::Orphaned) {
            warn!(
                event_id = %event.id,
                provider_reference = %payload.data.object.id,
                "settlement event references no known transaction"
            );
        }
        Ok(())
    }
}

/// Applies a refund settlement event to the refund named in its metadata.
pub struct RefundSettlementHandler<S, J>
where
    S: TransactionStore + Clone,
    J: JobStore + Clone,
{
    service: TransactionService<S, J>,
    status: RefundStatus,
}

impl<S, J> RefundSettlementHandler<S, J>
where
    S: TransactionStore + Clone,
    J: JobStore + Clone,
{
    pub fn new(service: TransactionService<S, J>, status: RefundStatus) -> Self {
        Self { service, status }
    }
}

#[async_trait]
impl<S, J> WebhookHandler for RefundSettlementHandler<S, J>
where
    S: TransactionStore + Clone + Send + Sync,
    J: JobStore + Clone + Send + Sync,
{
    async fn handle(&self, event: &WebhookEvent) -> HandlerResult {
        let payload = parse_payload(event)?;
        let Some(refund_id) = payload.data.object.metadata.refund_id else {
            return Err("refund event carries no refund_id metadata".into());
        };
        self.service
            .record_refund_result(refund_id, self.status, Some(&payload.data.object.id))
            .await?;
        Ok(())
    }
}

/// Builds the registry for every provider event type the system settles.
pub fn settlement_registry<S, J>(service: TransactionService<S, J>) -> HandlerRegistry
where
    S: TransactionStore + Clone + Send + Sync + 'static,
    J: JobStore + Clone + Send + Sync + 'static,
{
    use std::sync::Arc;

    HandlerRegistry::new()
        .register(
            "payment.succeeded",
            Arc::new(SettlementHandler::new(
                service.clone(),
                TransactionStatus::Succeeded,
            )),
        )
        .register(
            "payment.failed",
            Arc::new(SettlementHandler::new(
                service.clone(),
                TransactionStatus::Failed,
            )),
        )
        .register(
            "payment.canceled",
            Arc::new(SettlementHandler::new(
                service.clone(),
                TransactionStatus::Canceled,
            )),
        )
        .register(
            "refund.succeeded",
            Arc::new(RefundSettlementHandler::new(
                service.clone(),
                RefundStatus::Succeeded,
            )),
        )
        .register(
            "refund.failed",
            Arc::new(RefundSettlementHandler::new(service, RefundStatus::Failed)),
        )
}

/// Drives one stored webhook event through verification and dispatch.
///
/// Runs under the event's exclusive processing claim. Invalid signatures
/// and unrecognized event types are terminal (stored for inspection, not
/// retried); handler failures release the claim so the job can retry.
pub struct ProcessWebhookHandler<W, P>
where
    W: WebhookStore,
    P: PaymentProvider,
{
    store: W,
    provider: P,
    registry: HandlerRegistry,
}

impl<W, P> ProcessWebhookHandler<W, P>
where
    W: WebhookStore,
    P: PaymentProvider,
{
    pub fn new(store: W, provider: P, registry: HandlerRegistry) -> Self {
        Self {
            store,
            provider,
            registry,
        }
    }
}

#[async_trait]
impl<W, P> JobHandler for ProcessWebhookHandler<W, P>
where
    W: WebhookStore,
    P: PaymentProvider,
{
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id))]
    async fn run(&self, job: &Job) -> Result<()> {
        let args: ProcessWebhookArgs = serde_json::from_value(job.args.clone())?;

        if !self.store.try_claim(args.event_id).await? {
            debug!(event_id = %args.event_id, "event already claimed or processed");
            return Ok(());
        }
        let Some(event) = self.store.get(args.event_id).await? else {
            warn!(event_id = %args.event_id, "claimed event vanished");
            return Ok(());
        };

        if !self
            .provider
            .verify_signature(&event.payload, &event.signature_header)
        {
            warn!(event_id = %event.id, provider = %event.provider, "signature verification failed");
            metrics::counter!("webhook_signature_failures_total").increment(1);
            self.store
                .mark_processed(event.id, false, Some("signature verification failed"))
                .await?;
            return Ok(());
        }

        let Some(handler) = self.registry.handler_for(&event.event_type) else {
            info!(
                event_id = %event.id,
                event_type = %event.event_type,
                "no handler for event type, stored only"
            );
            self.store.mark_processed(event.id, true, None).await?;
            return Ok(());
        };

        match handler.handle(&event).await {
            Ok(()) => {
                self.store.mark_processed(event.id, true, None).await?;
                metrics::counter!("webhook_events_processed_total").increment(1);
                Ok(())
            }
            Err(e) => {
                self.store.release(event.id).await?;
                Err(WorkerError::Handler(e.to_string()))
            }
        }
    }
}
