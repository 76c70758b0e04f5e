use async_trait::async_trait;
use common::WebhookEventId;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::Result;
use crate::event::WebhookEvent;
use crate::store::{InsertOutcome, WebhookStore};

/// PostgreSQL-backed webhook store.
///
/// Deduplication rides on the `(provider, provider_event_id)` unique
/// constraint with `ON CONFLICT DO NOTHING`, so concurrent deliveries of
/// the same event resolve in the database. The processing claim is a
/// guarded update on the `processing` flag.
#[derive(Clone)]
pub struct PostgresWebhookStore {
    pool: PgPool,
}

const EVENT_COLUMNS: &str = "id, provider, provider_event_id, event_type, payload, \
                             signature_header, signature_verified, processed, error, received_at";

impl PostgresWebhookStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_event(row: PgRow) -> Result<WebhookEvent> {
        Ok(WebhookEvent {
            id: WebhookEventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            provider: row.try_get("provider")?,
            provider_event_id: row.try_get("provider_event_id")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            signature_header: row.try_get("signature_header")?,
            signature_verified: row.try_get("signature_verified")?,
            processed: row.try_get("processed")?,
            error: row.try_get("error")?,
            received_at: row.try_get("received_at")?,
        })
    }
}

#[async_trait]
impl WebhookStore for PostgresWebhookStore {
    async fn insert_if_new(&self, event: &WebhookEvent) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events
                (id, provider, provider_event_id, event_type, payload,
                 signature_header, signature_verified, processing, claimed_at,
                 processed, error, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, FALSE, NULL, FALSE, NULL, $7)
            ON CONFLICT ON CONSTRAINT uq_webhook_events_provider_event DO NOTHING
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(&event.provider)
        .bind(&event.provider_event_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(&event.signature_header)
        .bind(event.received_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::Duplicate)
        }
    }

    async fn get(&self, id: WebhookEventId) -> Result<Option<WebhookEvent>> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM webhook_events WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_event).transpose()
    }

    async fn try_claim(&self, id: WebhookEventId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET processing = TRUE, claimed_at = now()
            WHERE id = $1 AND NOT processing AND NOT processed
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_processed(
        &self,
        id: WebhookEventId,
        signature_verified: bool,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET processed = TRUE,
                processing = FALSE,
                claimed_at = NULL,
                signature_verified = $2,
                error = $3
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(signature_verified)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release(&self, id: WebhookEventId) -> Result<()> {
        sqlx::query("UPDATE webhook_events SET processing = FALSE, claimed_at = NULL WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn release_stale(&self, max_age: chrono::Duration) -> Result<u64> {
        let cutoff = chrono::Utc::now() - max_age;
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET processing = FALSE, claimed_at = NULL
            WHERE processing AND NOT processed AND claimed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_unprocessed(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM webhook_events WHERE NOT processed")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }
}
