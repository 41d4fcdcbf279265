// ABOUTME: SQLite implementation of the raw webhook audit log
// ABOUTME: Payloads are stored verbatim as JSON text; only status columns are ever updated

use super::{format_timestamp, parse_timestamp, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{NewRawWebhook, RawWebhook};
use crate::storage::RawWebhookStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteQueryResult, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

const SELECT_COLUMNS: &str = r"
    SELECT id, provider, external_user_id, data_structure, payload, received_at,
           processed, processed_at, error, queue_message_id
    FROM raw_webhooks
";

impl Database {
    /// Create the `raw_webhooks` table
    pub(super) async fn migrate_raw_webhooks(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS raw_webhooks (
                id TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                external_user_id TEXT NOT NULL,
                data_structure TEXT NOT NULL,
                payload TEXT NOT NULL,
                received_at TEXT NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0,
                processed_at TEXT,
                error TEXT,
                queue_message_id TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_raw_webhooks_pending ON raw_webhooks(processed, received_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn expect_row_updated(id: Uuid, result: &SqliteQueryResult) -> AppResult<()> {
    if result.rows_affected() == 0 {
        return Err(AppError::not_found(format!("Raw webhook {id}")));
    }
    Ok(())
}

fn row_to_raw_webhook(row: &SqliteRow) -> AppResult<RawWebhook> {
    let id: String = row.try_get("id")?;
    let payload: String = row.try_get("payload")?;
    let received_at: String = row.try_get("received_at")?;
    let processed_at: Option<String> = row.try_get("processed_at")?;

    Ok(RawWebhook {
        id: Uuid::parse_str(&id).map_err(|e| {
            AppError::serialization(format!("Invalid raw webhook id: {id}")).with_source(e)
        })?,
        provider: row.try_get("provider")?,
        external_user_id: row.try_get("external_user_id")?,
        data_structure: row.try_get("data_structure")?,
        payload: serde_json::from_str(&payload)?,
        received_at: parse_timestamp("received_at", &received_at)?,
        processed: row.try_get::<i64, _>("processed")? != 0,
        processed_at: processed_at
            .as_deref()
            .map(|value| parse_timestamp("processed_at", value))
            .transpose()?,
        error: row.try_get("error")?,
        queue_message_id: row.try_get("queue_message_id")?,
    })
}

#[async_trait]
impl RawWebhookStore for Database {
    async fn record(&self, webhook: NewRawWebhook) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_string(&webhook.payload)?;

        sqlx::query(
            r"
            INSERT INTO raw_webhooks (id, provider, external_user_id, data_structure, payload, received_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(id.to_string())
        .bind(&webhook.provider)
        .bind(&webhook.external_user_id)
        .bind(&webhook.data_structure)
        .bind(payload)
        .bind(format_timestamp(webhook.received_at))
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn link_queue_message(&self, id: Uuid, queue_message_id: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE raw_webhooks SET queue_message_id = $1 WHERE id = $2")
            .bind(queue_message_id)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        expect_row_updated(id, &result)
    }

    async fn mark_processed(&self, id: Uuid, error: Option<&str>) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE raw_webhooks SET processed = 1, processed_at = $1, error = $2 WHERE id = $3",
        )
        .bind(format_timestamp(Utc::now()))
        .bind(error)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        expect_row_updated(id, &result)
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE raw_webhooks SET error = $1 WHERE id = $2")
            .bind(error)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        expect_row_updated(id, &result)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<RawWebhook>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_raw_webhook).transpose()
    }

    async fn find_unprocessed(
        &self,
        limit: u32,
        received_before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<RawWebhook>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE processed = 0 AND ($1 IS NULL OR received_at < $1) ORDER BY received_at LIMIT $2"
        ))
        .bind(received_before.map(format_timestamp))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_raw_webhook).collect()
    }

    async fn find_failed(&self, limit: u32) -> AppResult<Vec<RawWebhook>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE error IS NOT NULL ORDER BY received_at LIMIT $1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_raw_webhook).collect()
    }
}
