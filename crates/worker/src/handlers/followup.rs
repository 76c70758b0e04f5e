//! Post-settlement follow-up jobs: record sync and user notification.

use async_trait::async_trait;
use domain::jobs::{NotifyArgs, SyncTargetArgs};
use domain::{DomainError, TargetPaymentStatus, TransactionService, TransactionStore};
use job_store::{Job, JobStore};
use tracing::warn;

use crate::error::{Result, WorkerError};
use crate::handlers::JobHandler;
use crate::notify::{Notification, NotificationChannel};

/// Pushes a settled transaction's outcome onto the linked domain record
/// through the catalog binding. The sink is idempotent, so replays after
/// a crash between apply and job completion are harmless.
pub struct SyncTargetHandler<S, J>
where
    S: TransactionStore + Clone,
    J: JobStore + Clone,
{
    service: TransactionService<S, J>,
}

impl<S, J> SyncTargetHandler<S, J>
where
    S: TransactionStore + Clone,
    J: JobStore + Clone,
{
    pub fn new(service: TransactionService<S, J>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S, J> JobHandler for SyncTargetHandler<S, J>
where
    S: TransactionStore + Clone + Send + Sync,
    J: JobStore + Clone + Send + Sync,
{
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id))]
    async fn run(&self, job: &Job) -> Result<()> {
        let args: SyncTargetArgs = serde_json::from_value(job.args.clone())?;
        let tx = self
            .service
            .store()
            .get(args.transaction_id)
            .await
            .map_err(WorkerError::Domain)?
            .ok_or(WorkerError::Domain(DomainError::TransactionNotFound(
                args.transaction_id,
            )))?;

        let Some(status) = TargetPaymentStatus::from_transaction_status(tx.status) else {
            warn!(transaction_id = %tx.id, status = %tx.status, "sync for non-terminal transaction");
            return Ok(());
        };

        let binding = self
            .service
            .catalog()
            .binding(&tx.target.target_type)
            .map_err(WorkerError::Domain)?;
        binding
            .sink()
            .apply_payment_status(tx.target.target_id, tx.id, status)
            .await
            .map_err(WorkerError::Domain)?;
        metrics::counter!("targets_synced_total").increment(1);
        Ok(())
    }
}

/// Delivers the payment outcome to the owning user.
pub struct NotifyHandler<C>
where
    C: NotificationChannel,
{
    channel: C,
}

impl<C> NotifyHandler<C>
where
    C: NotificationChannel,
{
    pub fn new(channel: C) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl<C> JobHandler for NotifyHandler<C>
where
    C: NotificationChannel,
{
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id))]
    async fn run(&self, job: &Job) -> Result<()> {
        let args: NotifyArgs = serde_json::from_value(job.args.clone())?;
        self.channel
            .send(Notification {
                user_id: args.user_id,
                transaction_id: args.transaction_id,
                outcome: args.outcome,
            })
            .await?;
        metrics::counter!("notifications_sent_total").increment(1);
        Ok(())
    }
}
