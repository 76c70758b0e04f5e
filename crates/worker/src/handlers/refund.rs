//! Refund submission job.

use async_trait::async_trait;
use domain::jobs::CreateRefundArgs;
use domain::{DomainError, RefundStatus, TransactionService, TransactionStore};
use job_store::{Job, JobStore};
use tracing::{debug, warn};

use crate::error::{Result, WorkerError};
use crate::handlers::JobHandler;
use crate::provider::{PaymentProvider, ProviderError};

/// Submits a pending refund to the provider.
///
/// A refund that already carries a provider reference was submitted on an
/// earlier attempt; replaying the job must not submit it twice.
pub struct CreateRefundHandler<S, J, P>
where
    S: TransactionStore + Clone,
    J: JobStore + Clone,
    P: PaymentProvider,
{
    service: TransactionService<S, J>,
    provider: P,
}

impl<S, J, P> CreateRefundHandler<S, J, P>
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
impl<S, J, P> JobHandler for CreateRefundHandler<S, J, P>
where
    S: TransactionStore + Clone + Send + Sync,
    J: JobStore + Clone + Send + Sync,
    P: PaymentProvider,
{
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id))]
    async fn run(&self, job: &Job) -> Result<()> {
        let args: CreateRefundArgs = serde_json::from_value(job.args.clone())?;
        let refund = self
            .service
            .store()
            .get_refund(args.refund_id)
            .await
            .map_err(WorkerError::Domain)?
            .ok_or(WorkerError::Domain(DomainError::RefundNotFound(
                args.refund_id,
            )))?;

        if refund.status != RefundStatus::Pending || refund.provider_reference.is_some() {
            debug!(refund_id = %refund.id, "refund already submitted or settled");
            return Ok(());
        }

        let tx = self
            .service
            .store()
            .get(refund.transaction_id)
            .await
            .map_err(WorkerError::Domain)?
            .ok_or(WorkerError::Domain(DomainError::TransactionNotFound(
                refund.transaction_id,
            )))?;
        let Some(reference) = tx.provider_reference.as_deref() else {
            return Err(WorkerError::Handler(
                "transaction has no provider reference".to_string(),
            ));
        };

        match self
            .provider
            .create_refund(reference, refund.id, refund.amount)
            .await
        {
            Ok(provider_ref) => {
                // Still pending; the provider webhook settles it.
                self.service
                    .store()
                    .set_refund_status(refund.id, RefundStatus::Pending, Some(&provider_ref))
                    .await
                    .map_err(WorkerError::Domain)?;
                Ok(())
            }
            Err(ProviderError::Transient(message)) => {
                Err(WorkerError::Provider(ProviderError::Transient(message)))
            }
            Err(ProviderError::Permanent(message)) => {
                warn!(refund_id = %refund.id, %message, "refund permanently rejected");
                self.service
                    .record_refund_result(refund.id, RefundStatus::Failed, None)
                    .await?;
                Ok(())
            }
        }
    }
}
