//! Provider-facing intent jobs: create, capture, cancel.

use async_trait::async_trait;
use domain::jobs::{CancelIntentArgs, CaptureIntentArgs, CreateIntentArgs};
use domain::{DomainError, TransactionService, TransactionStatus, TransactionStore};
use job_store::{Job, JobStore};
use tracing::{debug, warn};

use crate::error::{Result, WorkerError};
use crate::handlers::JobHandler;
use crate::provider::{PaymentProvider, ProviderError};

/// Registers the payment intent for a freshly created transaction.
///
/// Replay-safe: a transaction no longer in `pending_intent` was already
/// handled (or has settled) and the job completes without a provider call.
pub struct CreateIntentHandler<S, J, P>
where
    S: TransactionStore + Clone,
    J: JobStore + Clone,
    P: PaymentProvider,
{
    service: TransactionService<S, J>,
    provider: P,
}

impl<S, J, P> CreateIntentHandler<S, J, P>
where
    S: TransactionStore + Clone,
    J: JobStore + Clone,
    P: PaymentProvider,
{
    pub fn new(service: TransactionService<S, J>, provider: P) -> Self {
        Self { service, provider }
    }
}

#[async_trait]
impl<S, J, P> JobHandler for CreateIntentHandler<S, J, P>
where
    S: TransactionStore + Clone + Send + Sync,
    J: JobStore + Clone + Send + Sync,
    P: PaymentProvider,
{
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id))]
    async fn run(&self, job: &Job) -> Result<()> {
        let args: CreateIntentArgs = serde_json::from_value(job.args.clone())?;
        let tx = self
            .service
            .store()
            .get(args.transaction_id)
            .await
            .map_err(WorkerError::Domain)?
            .ok_or(WorkerError::Domain(DomainError::TransactionNotFound(
                args.transaction_id,
            )))?;

        if tx.status != TransactionStatus::PendingIntent {
            debug!(transaction_id = %tx.id, status = %tx.status, "intent already handled");
            return Ok(());
        }

        match self.provider.create_intent(&tx).await {
            Ok(intent) => {
                self.service
                    .record_intent_created(tx.id, &intent.reference, &intent.client_secret)
                    .await?;
                Ok(())
            }
            Err(ProviderError::Transient(message)) => {
                Err(WorkerError::Provider(ProviderError::Transient(message)))
            }
            Err(ProviderError::Permanent(message)) => {
                warn!(transaction_id = %tx.id, %message, "intent permanently rejected");
                self.service.record_intent_failed(tx.id, &message).await?;
                Ok(())
            }
        }
    }
}

/// Captures an authorized deferred intent. Settlement still arrives via
/// webhook; a permanent capture failure settles the row as failed.
pub struct CaptureIntentHandler<S, J, P>
where
    S: TransactionStore + Clone,
    J: JobStore + Clone,
    P: PaymentProvider,
{
    service: TransactionService<S, J>,
    provider: P,
}

impl<S, J, P> CaptureIntentHandler<S, J, P>
where
    S: TransactionStore + Clone,
    J: JobStore + Clone,
    P: PaymentProvider,
{
    pub fn new(service: TransactionService<S, J>, provider: P) -> Self {
        Self { service, provider }
    }
}

#[async_trait]
impl<S, J, P> JobHandler for CaptureIntentHandler<S, J, P>
where
    S: TransactionStore + Clone + Send + Sync,
    J: JobStore + Clone + Send + Sync,
    P: PaymentProvider,
{
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id))]
    async fn run(&self, job: &Job) -> Result<()> {
        let args: CaptureIntentArgs = serde_json::from_value(job.args.clone())?;
        let tx = self
            .service
            .store()
            .get(args.transaction_id)
            .await
            .map_err(WorkerError::Domain)?
            .ok_or(WorkerError::Domain(DomainError::TransactionNotFound(
                args.transaction_id,
            )))?;

        if tx.status != TransactionStatus::Pending {
            debug!(transaction_id = %tx.id, status = %tx.status, "capture no longer applicable");
            return Ok(());
        }
        let Some(reference) = tx.provider_reference.as_deref() else {
            return Err(WorkerError::Handler(
                "transaction has no provider reference".to_string(),
            ));
        };

        match self.provider.capture_intent(reference).await {
            Ok(()) => Ok(()),
            Err(ProviderError::Transient(message)) => {
                Err(WorkerError::Provider(ProviderError::Transient(message)))
            }
            Err(ProviderError::Permanent(message)) => {
                warn!(transaction_id = %tx.id, %message, "capture permanently rejected");
                self.service
                    .settle_from_webhook(reference, TransactionStatus::Failed, Some(&message))
                    .await?;
                Ok(())
            }
        }
    }
}

/// Voids an open intent. The terminal `canceled` status is only ever
/// recorded when the provider confirms via webhook.
pub struct CancelIntentHandler<S, J, P>
where
    S: TransactionStore + Clone,
    J: JobStore + Clone,
    P: PaymentProvider,
{
    service: TransactionService<S, J>,
    provider: P,
}

impl<S, J, P> CancelIntentHandler<S, J, P>
where
    S: TransactionStore + Clone,
    J: JobStore + Clone,
    P: PaymentProvider,
{
    pub fn new(service: TransactionService<S, J>, provider: P) -> Self {
        Self { service, provider }
    }
}

#[async_trait]
impl<S, J, P> JobHandler for CancelIntentHandler<S, J, P>
where
    S: TransactionStore + Clone + Send + Sync,
    J: JobStore + Clone + Send + Sync,
    P: PaymentProvider,
{
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id))]
    async fn run(&self, job: &Job) -> Result<()> {
        let args: CancelIntentArgs = serde_json::from_value(job.args.clone())?;
        let tx = self
            .service
            .store()
            .get(args.transaction_id)
            .await
            .map_err(WorkerError::Domain)?
            .ok_or(WorkerError::Domain(DomainError::TransactionNotFound(
                args.transaction_id,
            )))?;

        if tx.status.is_terminal() {
            debug!(transaction_id = %tx.id, status = %tx.status, "cancel no longer applicable");
            return Ok(());
        }
        let Some(reference) = tx.provider_reference.as_deref() else {
            return Err(WorkerError::Handler(
                "transaction has no provider reference".to_string(),
            ));
        };

        match self.provider.cancel_intent(reference).await {
            Ok(()) => Ok(()),
            Err(ProviderError::Transient(message)) => {
                Err(WorkerError::Provider(ProviderError::Transient(message)))
            }
            Err(ProviderError::Permanent(message)) => {
                // The intent may have settled under us; the webhook for
                // that settlement is authoritative.
                warn!(transaction_id = %tx.id, %message, "cancel rejected by provider");
                Ok(())
            }
        }
    }
}
