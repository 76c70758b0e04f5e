use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{Money, RefundId, TransactionId};
use tokio::sync::RwLock;

use crate::error::{DomainError, Result};
use crate::model::{Refund, TargetRef, Transaction};
use crate::status::{RefundStatus, TransactionStatus};
use crate::store::{TransactionStore, TransitionOutcome, TransitionUpdate};

#[derive(Default)]
struct Inner {
    transactions: HashMap<TransactionId, Transaction>,
    refunds: HashMap<RefundId, Refund>,
}

/// In-memory transaction store implementation for testing.
///
/// Provides the same guarded-transition semantics as the PostgreSQL
/// implementation; atomicity comes from holding the write lock across the
/// read-check-write.
#[derive(Clone, Default)]
pub struct InMemoryTransactionStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryTransactionStore {
    /// Creates a new empty in-memory transaction store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of transaction rows.
    pub async fn transaction_count(&self) -> usize {
        self.inner.read().await.transactions.len()
    }

    /// Returns all transaction rows for a target, oldest first.
    /// Superseded rows are retained as audit history.
    pub async fn history_for_target(&self, target: &TargetRef) -> Vec<Transaction> {
        let inner = self.inner.read().await;
        let mut rows: Vec<_> = inner
            .transactions
            .values()
            .filter(|t| &t.target == target)
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.created_at);
        rows
    }

    fn reserved_total(inner: &Inner, id: TransactionId) -> Money {
        inner
            .refunds
            .values()
            .filter(|r| r.transaction_id == id && r.status != RefundStatus::Failed)
            .fold(Money::zero(), |acc, r| acc.add(r.amount))
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, tx: &Transaction) -> Result<()> {
        self.inner
            .write()
            .await
            .transactions
            .insert(tx.id, tx.clone());
        Ok(())
    }

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self.inner.read().await.transactions.get(&id).cloned())
    }

    async fn get_by_provider_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let inner = self.inner.read().await;
        Ok(inner
            .transactions
            .values()
            .find(|t| t.provider_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn current_for_target(&self, target: &TargetRef) -> Result<Option<Transaction>> {
        let inner = self.inner.read().await;
        Ok(inner
            .transactions
            .values()
            .filter(|t| &t.target == target)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn transition(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        update: TransitionUpdate,
    ) -> Result<TransitionOutcome> {
        let mut inner = self.inner.write().await;
        let tx = inner
            .transactions
            .get_mut(&id)
            .ok_or(DomainError::TransactionNotFound(id))?;

        if tx.status != expected {
            if tx.status.is_terminal() {
                return Ok(TransitionOutcome::AlreadySettled(tx.clone()));
            }
            return Err(DomainError::StatusConflict {
                id,
                expected,
                actual: tx.status,
            });
        }

        if !expected.can_transition_to(update.to) {
            return Err(DomainError::IllegalTransition {
                id,
                from: expected,
                to: update.to,
            });
        }

        let now = Utc::now();
        tx.status = update.to;
        tx.updated_at = now;
        if let Some(reference) = update.provider_reference {
            tx.provider_reference = Some(reference);
        }
        if let Some(secret) = update.provider_secret {
            tx.provider_secret = Some(secret);
        }
        if let Some(error) = update.error_message {
            tx.error_message = Some(error);
        }
        if update.to.is_terminal() && tx.completed_at.is_none() {
            tx.completed_at = Some(now);
        }

        metrics::counter!("transactions_transitioned_total").increment(1);
        Ok(TransitionOutcome::Applied(tx.clone()))
    }

    async fn insert_refund(&self, refund: &Refund) -> Result<()> {
        let mut inner = self.inner.write().await;
        let tx = inner
            .transactions
            .get(&refund.transaction_id)
            .ok_or(DomainError::TransactionNotFound(refund.transaction_id))?;

        let amount = tx.amount;
        let reserved = Self::reserved_total(&inner, refund.transaction_id);
        let remaining = amount.subtract(reserved);
        if refund.amount > remaining {
            return Err(DomainError::RefundExceedsAmount {
                requested: refund.amount,
                remaining,
            });
        }

        inner.refunds.insert(refund.id, refund.clone());
        Ok(())
    }

    async fn get_refund(&self, id: RefundId) -> Result<Option<Refund>> {
        Ok(self.inner.read().await.refunds.get(&id).cloned())
    }

    async fn refunds_for_transaction(&self, id: TransactionId) -> Result<Vec<Refund>> {
        let inner = self.inner.read().await;
        let mut refunds: Vec<_> = inner
            .refunds
            .values()
            .filter(|r| r.transaction_id == id)
            .cloned()
            .collect();
        refunds.sort_by_key(|r| r.created_at);
        Ok(refunds)
    }

    async fn set_refund_status(
        &self,
        id: RefundId,
        status: RefundStatus,
        provider_reference: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let refund = inner
            .refunds
            .get_mut(&id)
            .ok_or(DomainError::RefundNotFound(id))?;
        refund.status = status;
        refund.updated_at = Utc::now();
        if let Some(reference) = provider_reference {
            refund.provider_reference = Some(reference.to_string());
        }
        Ok(())
    }

    async fn refunded_total(&self, id: TransactionId) -> Result<Money> {
        let inner = self.inner.read().await;
        Ok(inner
            .refunds
            .values()
            .filter(|r| r.transaction_id == id && r.status == RefundStatus::Succeeded)
            .fold(Money::zero(), |acc, r| acc.add(r.amount)))
    }

    async fn reserved_refund_total(&self, id: TransactionId) -> Result<Money> {
        let inner = self.inner.read().await;
        Ok(Self::reserved_total(&inner, id))
    }
}
