use async_trait::async_trait;
use chrono::Utc;
use common::{Money, RefundId, TransactionId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::{DomainError, Result};
use crate::model::{Refund, TargetRef, Transaction};
use crate::status::{CaptureMode, RefundStatus, TransactionStatus};
use crate::store::{TransactionStore, TransitionOutcome, TransitionUpdate};

/// PostgreSQL-backed transaction store implementation.
///
/// Transitions take a row lock (`SELECT ... FOR UPDATE`) for the duration
/// of the compare-and-swap; locks are per-transaction-row, so unrelated
/// transactions never contend.
#[derive(Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
}

const TX_COLUMNS: &str = "id, owner_id, target_type, target_id, amount_cents, currency, status, \
                          capture_mode, provider_reference, provider_secret, description, \
                          error_message, created_at, updated_at, completed_at";

const REFUND_COLUMNS: &str =
    "id, transaction_id, amount_cents, status, reason, provider_reference, created_at, updated_at";

fn decode_err(msg: String) -> DomainError {
    DomainError::Database(sqlx::Error::Decode(msg.into()))
}

impl PostgresTransactionStore {
    /// Creates a new PostgreSQL transaction store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_transaction(row: PgRow) -> Result<Transaction> {
        let status: String = row.try_get("status")?;
        let status = TransactionStatus::parse(&status)
            .ok_or_else(|| decode_err(format!("unknown transaction status: {status}")))?;
        let capture_mode: String = row.try_get("capture_mode")?;
        let capture_mode = CaptureMode::parse(&capture_mode)
            .ok_or_else(|| decode_err(format!("unknown capture mode: {capture_mode}")))?;

        Ok(Transaction {
            id: TransactionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            owner_id: UserId::from_uuid(row.try_get::<Uuid, _>("owner_id")?),
            target: TargetRef {
                target_type: row.try_get("target_type")?,
                target_id: row.try_get("target_id")?,
            },
            amount: Money::from_cents(row.try_get("amount_cents")?),
            currency: row.try_get("currency")?,
            status,
            capture_mode,
            provider_reference: row.try_get("provider_reference")?,
            provider_secret: row.try_get("provider_secret")?,
            description: row.try_get("description")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn row_to_refund(row: PgRow) -> Result<Refund> {
        let status: String = row.try_get("status")?;
        let status = RefundStatus::parse(&status)
            .ok_or_else(|| decode_err(format!("unknown refund status: {status}")))?;

        Ok(Refund {
            id: RefundId::from_uuid(row.try_get::<Uuid, _>("id")?),
            transaction_id: TransactionId::from_uuid(row.try_get::<Uuid, _>("transaction_id")?),
            amount: Money::from_cents(row.try_get("amount_cents")?),
            status,
            reason: row.try_get("reason")?,
            provider_reference: row.try_get("provider_reference")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn insert(&self, tx: &Transaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, owner_id, target_type, target_id, amount_cents,
                                      currency, status, capture_mode, description,
                                      created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(tx.id.as_uuid())
        .bind(tx.owner_id.as_uuid())
        .bind(&tx.target.target_type)
        .bind(tx.target.target_id)
        .bind(tx.amount.cents())
        .bind(&tx.currency)
        .bind(tx.status.as_str())
        .bind(tx.capture_mode.as_str())
        .bind(&tx.description)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!("SELECT {TX_COLUMNS} FROM transactions WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_transaction).transpose()
    }

    async fn get_by_provider_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE provider_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_transaction).transpose()
    }

    async fn current_for_target(&self, target: &TargetRef) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TX_COLUMNS} FROM transactions \
             WHERE target_type = $1 AND target_id = $2 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(&target.target_type)
        .bind(target.target_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_transaction).transpose()
    }

    async fn transition(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        update: TransitionUpdate,
    ) -> Result<TransitionOutcome> {
        let mut db_tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *db_tx)
        .await?
        .ok_or(DomainError::TransactionNotFound(id))?;

        let current = Self::row_to_transaction(row)?;

        if current.status != expected {
            if current.status.is_terminal() {
                return Ok(TransitionOutcome::AlreadySettled(current));
            }
            return Err(DomainError::StatusConflict {
                id,
                expected,
                actual: current.status,
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
        let completed_at = if update.to.is_terminal() && current.completed_at.is_none() {
            Some(now)
        } else {
            current.completed_at
        };

        let row = sqlx::query(&format!(
            r#"
            UPDATE transactions
            SET status = $2,
                provider_reference = COALESCE($3, provider_reference),
                provider_secret = COALESCE($4, provider_secret),
                error_message = COALESCE($5, error_message),
                completed_at = $6,
                updated_at = $7
            WHERE id = $1
            RETURNING {TX_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(update.to.as_str())
        .bind(&update.provider_reference)
        .bind(&update.provider_secret)
        .bind(&update.error_message)
        .bind(completed_at)
        .bind(now)
        .fetch_one(&mut *db_tx)
        .await?;

        let updated = Self::row_to_transaction(row)?;
        db_tx.commit().await?;

        metrics::counter!("transactions_transitioned_total").increment(1);
        Ok(TransitionOutcome::Applied(updated))
    }

    async fn insert_refund(&self, refund: &Refund) -> Result<()> {
        let mut db_tx = self.pool.begin().await?;

        // Lock the parent row so two concurrent refunds serialize on the
        // sum check.
        let amount_cents: i64 =
            sqlx::query_scalar("SELECT amount_cents FROM transactions WHERE id = $1 FOR UPDATE")
                .bind(refund.transaction_id.as_uuid())
                .fetch_optional(&mut *db_tx)
                .await?
                .ok_or(DomainError::TransactionNotFound(refund.transaction_id))?;

        let reserved_cents: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM refunds \
             WHERE transaction_id = $1 AND status <> 'failed'",
        )
        .bind(refund.transaction_id.as_uuid())
        .fetch_one(&mut *db_tx)
        .await?;

        let remaining = Money::from_cents(amount_cents - reserved_cents);
        if refund.amount > remaining {
            return Err(DomainError::RefundExceedsAmount {
                requested: refund.amount,
                remaining,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO refunds (id, transaction_id, amount_cents, status, reason,
                                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(refund.id.as_uuid())
        .bind(refund.transaction_id.as_uuid())
        .bind(refund.amount.cents())
        .bind(refund.status.as_str())
        .bind(&refund.reason)
        .bind(refund.created_at)
        .bind(refund.updated_at)
        .execute(&mut *db_tx)
        .await?;

        db_tx.commit().await?;
        Ok(())
    }

    async fn get_refund(&self, id: RefundId) -> Result<Option<Refund>> {
        let row = sqlx::query(&format!("SELECT {REFUND_COLUMNS} FROM refunds WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_refund).transpose()
    }

    async fn refunds_for_transaction(&self, id: TransactionId) -> Result<Vec<Refund>> {
        let rows = sqlx::query(&format!(
            "SELECT {REFUND_COLUMNS} FROM refunds WHERE transaction_id = $1 ORDER BY created_at ASC"
        ))
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_refund).collect()
    }

    async fn set_refund_status(
        &self,
        id: RefundId,
        status: RefundStatus,
        provider_reference: Option<&str>,
    ) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE refunds SET status = $2, \
             provider_reference = COALESCE($3, provider_reference), updated_at = now() \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(provider_reference)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DomainError::RefundNotFound(id));
        }
        Ok(())
    }

    async fn refunded_total(&self, id: TransactionId) -> Result<Money> {
        let cents: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM refunds \
             WHERE transaction_id = $1 AND status = 'succeeded'",
        )
        .bind(id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(cents))
    }

    async fn reserved_refund_total(&self, id: TransactionId) -> Result<Money> {
        let cents: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM refunds \
             WHERE transaction_id = $1 AND status <> 'failed'",
        )
        .bind(id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(cents))
    }
}
