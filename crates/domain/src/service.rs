//! Transaction lifecycle orchestration.
//!
//! The service owns every status transition and every job it schedules.
//! Writes go through the store's guarded `transition`; provider calls
//! never happen inline here, they are enqueued as jobs and executed by
//! the worker pool. The synchronous checkout path only waits, bounded,
//! for the intent job to publish the client secret.

use std::time::Duration;

use common::{Money, TransactionId, UserId};
use job_store::{JobStore, NewJob};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{TargetCatalog, TargetPaymentStatus};
use crate::error::{DomainError, Result};
use crate::jobs::{
    CancelIntentArgs, CaptureIntentArgs, CreateIntentArgs, CreateRefundArgs, NotifyArgs,
    SyncTargetArgs, KIND_CANCEL_INTENT, KIND_CAPTURE_INTENT, KIND_CREATE_INTENT,
    KIND_CREATE_REFUND, KIND_NOTIFY, KIND_SYNC_TARGET, QUEUE_INTERNAL, QUEUE_PROVIDER,
};
use crate::model::{Refund, TargetRef, Transaction};
use crate::status::{CaptureMode, RefundStatus, TransactionStatus};
use crate::store::{TransactionStore, TransitionOutcome, TransitionUpdate};

/// Tunables for the synchronous checkout path.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Default currency stamped onto new transactions.
    pub currency: String,
    /// How long a checkout call waits for the intent job before giving up
    /// with a timeout. The job itself keeps running.
    pub intent_timeout: Duration,
    /// Interval between store polls while waiting for the intent.
    pub poll_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            currency: "usd".to_string(),
            intent_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Everything a client needs to complete the payment externally.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReady {
    pub transaction_id: TransactionId,
    pub client_secret: String,
    pub capture_mode: CaptureMode,
}

/// Result of applying a provider-reported settlement.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// The transition was applied; follow-up jobs were scheduled.
    Applied(Transaction),
    /// The transaction had already settled; nothing changed.
    AlreadySettled(Transaction),
    /// No transaction carries this provider reference.
    Orphaned,
}

/// Orchestrates transaction and refund lifecycles over a store and a job
/// queue.
#[derive(Clone)]
pub struct TransactionService<S, J>
where
    S: TransactionStore,
    J: JobStore,
{
    store: S,
    job_store: J,
    catalog: TargetCatalog,
    config: ServiceConfig,
}

impl<S, J> TransactionService<S, J>
where
    S: TransactionStore,
    J: JobStore,
{
    pub fn new(store: S, job_store: J, catalog: TargetCatalog, config: ServiceConfig) -> Self {
        Self {
            store,
            job_store,
            catalog,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &TargetCatalog {
        &self.catalog
    }

    /// Starts (or resumes) a checkout for a target.
    ///
    /// If the target already has an open transaction the call attaches to
    /// it instead of creating a second one, so a double-clicked checkout
    /// button yields one transaction. Otherwise a new `pending_intent` row
    /// is inserted and a `create_intent` job enqueued; the call then waits,
    /// bounded by `intent_timeout`, for the worker to publish the client
    /// secret.
    #[tracing::instrument(skip(self), fields(target = %target))]
    pub async fn create_transaction(
        &self,
        owner_id: UserId,
        target: TargetRef,
        amount: Money,
        description: Option<String>,
    ) -> Result<CheckoutReady> {
        if !amount.is_positive() {
            return Err(DomainError::InvalidAmount(amount));
        }
        let capture_mode = self.catalog.capture_mode(&target.target_type)?;

        if let Some(existing) = self.store.current_for_target(&target).await? {
            // The client secret must only ever reach the owner who opened
            // the checkout.
            if !existing.status.is_terminal() && existing.owner_id != owner_id {
                warn!(transaction_id = %existing.id, "checkout attempt against another owner's open transaction");
                return Err(DomainError::OwnerMismatch { id: existing.id });
            }
            match existing.status {
                TransactionStatus::PendingIntent => {
                    info!(transaction_id = %existing.id, "resuming checkout awaiting intent");
                    return self.await_intent(existing.id).await;
                }
                TransactionStatus::Pending => {
                    info!(transaction_id = %existing.id, "resuming open checkout");
                    return self.checkout_ready(&existing);
                }
                _ => {}
            }
        }

        let tx = Transaction::new(
            owner_id,
            target,
            amount,
            self.config.currency.clone(),
            capture_mode,
            description,
        );
        let id = tx.id;
        self.store.insert(&tx).await?;
        metrics::counter!("transactions_created_total").increment(1);

        self.enqueue_provider_job(KIND_CREATE_INTENT, &CreateIntentArgs { transaction_id: id })
            .await?;

        info!(transaction_id = %id, "transaction created, awaiting intent");
        self.await_intent(id).await
    }

    /// Creates a fresh transaction for the target of a failed or canceled
    /// one. The old row is left untouched as audit history; the new row
    /// becomes the target's current transaction by creation order.
    #[tracing::instrument(skip(self))]
    pub async fn retry_transaction(&self, id: TransactionId) -> Result<CheckoutReady> {
        let old = self
            .store
            .get(id)
            .await?
            .ok_or(DomainError::TransactionNotFound(id))?;
        if !old.status.allows_retry() {
            return Err(DomainError::StatusConflict {
                id,
                expected: TransactionStatus::Failed,
                actual: old.status,
            });
        }

        let tx = Transaction::new(
            old.owner_id,
            old.target.clone(),
            old.amount,
            old.currency.clone(),
            old.capture_mode,
            old.description.clone(),
        );
        let new_id = tx.id;
        self.store.insert(&tx).await?;
        metrics::counter!("transactions_retried_total").increment(1);

        self.enqueue_provider_job(
            KIND_CREATE_INTENT,
            &CreateIntentArgs {
                transaction_id: new_id,
            },
        )
        .await?;

        info!(old_transaction_id = %id, transaction_id = %new_id, "transaction retried");
        self.await_intent(new_id).await
    }

    /// Records a successful intent registration from the provider worker.
    pub async fn record_intent_created(
        &self,
        id: TransactionId,
        provider_reference: &str,
        provider_secret: &str,
    ) -> Result<()> {
        let update = TransitionUpdate::to(TransactionStatus::Pending)
            .with_intent(provider_reference, provider_secret);
        self.store
            .transition(id, TransactionStatus::PendingIntent, update)
            .await?;
        Ok(())
    }

    /// Records a permanent intent failure. The transaction settles as
    /// failed and terminal follow-up jobs are scheduled.
    pub async fn record_intent_failed(&self, id: TransactionId, error: &str) -> Result<()> {
        let update = TransitionUpdate::to(TransactionStatus::Failed).with_error(error);
        let outcome = self
            .store
            .transition(id, TransactionStatus::PendingIntent, update)
            .await?;
        if outcome.was_applied() {
            self.enqueue_settlement_followups(outcome.transaction())
                .await?;
        }
        Ok(())
    }

    /// Applies a settlement reported by the provider, matched by intent
    /// reference.
    ///
    /// Duplicate or late deliveries are absorbed: only the first applied
    /// transition schedules the sync and notify follow-up jobs, so the
    /// linked record is touched once per settlement no matter how many
    /// times the provider redelivers.
    #[tracing::instrument(skip(self))]
    pub async fn settle_from_webhook(
        &self,
        provider_reference: &str,
        status: TransactionStatus,
        error: Option<&str>,
    ) -> Result<WebhookOutcome> {
        let Some(tx) = self
            .store
            .get_by_provider_reference(provider_reference)
            .await?
        else {
            warn!(provider_reference, "settlement for unknown intent reference");
            metrics::counter!("webhook_orphaned_total").increment(1);
            return Ok(WebhookOutcome::Orphaned);
        };

        let mut update = TransitionUpdate::to(status);
        if let Some(error) = error {
            update = update.with_error(error);
        }
        let outcome = self
            .store
            .transition(tx.id, TransactionStatus::Pending, update)
            .await?;

        match outcome {
            TransitionOutcome::Applied(tx) => {
                metrics::counter!("transactions_settled_total", "status" => status.as_str())
                    .increment(1);
                self.enqueue_settlement_followups(&tx).await?;
                info!(transaction_id = %tx.id, status = %status, "transaction settled");
                Ok(WebhookOutcome::Applied(tx))
            }
            TransitionOutcome::AlreadySettled(tx) => {
                info!(transaction_id = %tx.id, "duplicate settlement absorbed");
                Ok(WebhookOutcome::AlreadySettled(tx))
            }
        }
    }

    /// Requests capture of a deferred-mode transaction that the provider
    /// has authorized but not yet settled.
    pub async fn capture_transaction(&self, id: TransactionId) -> Result<()> {
        let tx = self
            .store
            .get(id)
            .await?
            .ok_or(DomainError::TransactionNotFound(id))?;
        if tx.capture_mode != CaptureMode::Deferred {
            return Err(DomainError::IllegalTransition {
                id,
                from: tx.status,
                to: TransactionStatus::Succeeded,
            });
        }
        if tx.status != TransactionStatus::Pending {
            return Err(DomainError::StatusConflict {
                id,
                expected: TransactionStatus::Pending,
                actual: tx.status,
            });
        }
        self.enqueue_provider_job(KIND_CAPTURE_INTENT, &CaptureIntentArgs { transaction_id: id })
            .await?;
        Ok(())
    }

    /// Requests cancellation of an open transaction's intent. The row
    /// settles as canceled only once the provider confirms via webhook.
    pub async fn cancel_transaction(&self, id: TransactionId) -> Result<()> {
        let tx = self
            .store
            .get(id)
            .await?
            .ok_or(DomainError::TransactionNotFound(id))?;
        if tx.status != TransactionStatus::Pending {
            return Err(DomainError::StatusConflict {
                id,
                expected: TransactionStatus::Pending,
                actual: tx.status,
            });
        }
        self.enqueue_provider_job(KIND_CANCEL_INTENT, &CancelIntentArgs { transaction_id: id })
            .await?;
        Ok(())
    }

    /// Starts a refund against a succeeded transaction.
    ///
    /// With no amount given the full refundable remainder is requested.
    /// Pending refunds count against that remainder, so concurrent refunds
    /// cannot jointly exceed the captured amount.
    #[tracing::instrument(skip(self))]
    pub async fn refund_transaction(
        &self,
        id: TransactionId,
        amount: Option<Money>,
        reason: Option<String>,
    ) -> Result<Refund> {
        let tx = self
            .store
            .get(id)
            .await?
            .ok_or(DomainError::TransactionNotFound(id))?;
        if tx.status != TransactionStatus::Succeeded {
            return Err(DomainError::StatusConflict {
                id,
                expected: TransactionStatus::Succeeded,
                actual: tx.status,
            });
        }

        let reserved = self.store.reserved_refund_total(id).await?;
        let remaining = tx.amount.subtract(reserved);
        let requested = amount.unwrap_or(remaining);
        if !requested.is_positive() || requested.cents() > remaining.cents() {
            return Err(DomainError::RefundExceedsAmount {
                requested,
                remaining,
            });
        }

        let refund = Refund::new(id, requested, reason);
        self.store.insert_refund(&refund).await?;
        metrics::counter!("refunds_created_total").increment(1);

        self.job_store
            .enqueue(
                NewJob::new(
                    KIND_CREATE_REFUND,
                    serde_json::to_value(CreateRefundArgs {
                        refund_id: refund.id,
                    })?,
                )
                .on_queue(QUEUE_PROVIDER),
            )
            .await?;

        info!(transaction_id = %id, refund_id = %refund.id, amount = %requested, "refund started");
        Ok(refund)
    }

    /// Records the provider's verdict on a submitted refund.
    pub async fn record_refund_result(
        &self,
        id: common::RefundId,
        status: RefundStatus,
        provider_reference: Option<&str>,
    ) -> Result<()> {
        self.store
            .set_refund_status(id, status, provider_reference)
            .await?;
        metrics::counter!("refunds_settled_total", "status" => status.as_str()).increment(1);
        Ok(())
    }

    /// Schedules the record-sync and owner-notification jobs for a freshly
    /// settled transaction.
    async fn enqueue_settlement_followups(&self, tx: &Transaction) -> Result<()> {
        let Some(outcome) = TargetPaymentStatus::from_transaction_status(tx.status) else {
            return Ok(());
        };

        self.job_store
            .enqueue(
                NewJob::new(
                    KIND_SYNC_TARGET,
                    serde_json::to_value(SyncTargetArgs {
                        transaction_id: tx.id,
                    })?,
                )
                .on_queue(QUEUE_INTERNAL),
            )
            .await?;
        self.job_store
            .enqueue(
                NewJob::new(
                    KIND_NOTIFY,
                    serde_json::to_value(NotifyArgs {
                        user_id: tx.owner_id,
                        transaction_id: tx.id,
                        outcome,
                    })?,
                )
                .on_queue(QUEUE_INTERNAL),
            )
            .await?;
        Ok(())
    }

    async fn enqueue_provider_job<A: Serialize>(&self, kind: &str, args: &A) -> Result<()> {
        self.job_store
            .enqueue(NewJob::new(kind, serde_json::to_value(args)?).on_queue(QUEUE_PROVIDER))
            .await?;
        Ok(())
    }

    /// Polls the store until the intent job publishes a client secret or
    /// settles the transaction as failed. On timeout the transaction is
    /// left alone; the job is still in flight and the client can retry the
    /// checkout call to attach to it.
    async fn await_intent(&self, id: TransactionId) -> Result<CheckoutReady> {
        let deadline = tokio::time::Instant::now() + self.config.intent_timeout;
        loop {
            let tx = self
                .store
                .get(id)
                .await?
                .ok_or(DomainError::TransactionNotFound(id))?;
            match tx.status {
                TransactionStatus::Pending => return self.checkout_ready(&tx),
                TransactionStatus::PendingIntent => {}
                TransactionStatus::Failed => {
                    return Err(DomainError::IntentFailed(
                        tx.error_message
                            .unwrap_or_else(|| "intent registration failed".to_string()),
                    ));
                }
                other => {
                    return Err(DomainError::StatusConflict {
                        id,
                        expected: TransactionStatus::Pending,
                        actual: other,
                    });
                }
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(transaction_id = %id, "timed out waiting for intent");
                metrics::counter!("intent_timeouts_total").increment(1);
                return Err(DomainError::IntentTimeout(id));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    fn checkout_ready(&self, tx: &Transaction) -> Result<CheckoutReady> {
        let client_secret = tx
            .provider_secret
            .clone()
            .ok_or_else(|| DomainError::IntentFailed("intent has no client secret".to_string()))?;
        Ok(CheckoutReady {
            transaction_id: tx.id,
            client_secret,
            capture_mode: tx.capture_mode,
        })
    }
}
