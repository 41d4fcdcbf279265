// ABOUTME: SQLite implementation of the per-user canonical health document store
// ABOUTME: Nested paths are updated in place with json_set, guarded by compare-and-set on the category

use super::{format_timestamp, Database};
use crate::errors::AppResult;
use crate::models::{
    CanonicalRecord, ConnectionAction, ConnectionUpdate, DeviceConnection, DeviceSource,
    HealthCategory, UserHealthDocument,
};
use crate::storage::CanonicalStateStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// JSON path of one device inside a user document
///
/// Device sources are restricted to `[a-z0-9_-]`, so quoting the key is
/// enough to make it a single path label.
fn device_path(device: &DeviceSource) -> String {
    format!("$.devices.\"{}\"", device.as_str())
}

impl Database {
    /// Create the `health_documents` table
    pub(super) async fn migrate_health_documents(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS health_documents (
                user_id TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert an empty document for the user unless one exists
    async fn ensure_document(&self, user_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO health_documents (user_id, document, updated_at)
            VALUES ($1, json_object('user_id', $1, 'devices', json_object()), $2)
            ON CONFLICT(user_id) DO NOTHING
            ",
        )
        .bind(user_id.to_string())
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Raw JSON text at `path` inside the user's document
    async fn extract_json(&self, user_id: Uuid, path: &str) -> AppResult<Option<String>> {
        let value = sqlx::query_scalar::<_, Option<String>>(
            "SELECT json(json_extract(document, $1)) FROM health_documents WHERE user_id = $2",
        )
        .bind(path)
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.flatten())
    }
}

#[async_trait]
impl CanonicalStateStore for Database {
    async fn load_category(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
        category: HealthCategory,
    ) -> AppResult<Option<CanonicalRecord>> {
        let path = format!("{}.data.{}", device_path(device), category.as_str());
        let Some(json) = self.extract_json(user_id, &path).await? else {
            return Ok(None);
        };

        let record = CanonicalRecord::from_category_value(category, serde_json::from_str(&json)?)?;
        Ok((!matches!(&record, CanonicalRecord::ActivityEvents(events) if events.is_empty()))
            .then_some(record))
    }

    async fn store_category(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
        expected: Option<&CanonicalRecord>,
        record: &CanonicalRecord,
        synced_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.ensure_document(user_id).await?;

        let device = device_path(device);
        let value = serde_json::to_string(&record.to_category_value()?)?;
        let expected = expected
            .map(|record| {
                record
                    .to_category_value()
                    .and_then(|value| serde_json::to_string(&value))
            })
            .transpose()?;
        let synced_at = format_timestamp(synced_at);

        // An absent expectation also matches an empty event list, which
        // load_category reports as no record
        let result = sqlx::query(
            r"
            UPDATE health_documents
            SET document = json_set(document,
                    $1, json($2),
                    $3, $4,
                    $5, json('true')),
                updated_at = $4
            WHERE user_id = $6
              AND CASE
                    WHEN $7 IS NULL THEN
                        json_extract(document, $1) IS NULL
                        OR json(json_extract(document, $1)) = '[]'
                    ELSE json(json_extract(document, $1)) = json($7)
                  END
            ",
        )
        .bind(format!("{device}.data.{}", record.category().as_str()))
        .bind(value)
        .bind(format!("{device}.last_sync"))
        .bind(synced_at)
        .bind(format!("{device}.connected"))
        .bind(user_id.to_string())
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn apply_connection_update(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
        update: ConnectionUpdate,
    ) -> AppResult<bool> {
        self.ensure_document(user_id).await?;

        let device = device_path(device);
        let (connected, stamp_field) = match update.action {
            ConnectionAction::Connected => ("true", "connected_at"),
            ConnectionAction::Revoked => ("false", "revoked_at"),
        };

        // Older than the latest applied notification: leave the row untouched
        let result = sqlx::query(
            r"
            UPDATE health_documents
            SET document = json_set(document,
                    $1, json($2),
                    $3, $4),
                updated_at = $5
            WHERE user_id = $6
              AND $4 >= max(COALESCE(json_extract(document, $7), ''),
                            COALESCE(json_extract(document, $8), ''))
            ",
        )
        .bind(format!("{device}.connected"))
        .bind(connected)
        .bind(format!("{device}.{stamp_field}"))
        .bind(format_timestamp(update.at))
        .bind(format_timestamp(Utc::now()))
        .bind(user_id.to_string())
        .bind(format!("{device}.connected_at"))
        .bind(format!("{device}.revoked_at"))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn load_device(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
    ) -> AppResult<Option<DeviceConnection>> {
        self.extract_json(user_id, &device_path(device))
            .await?
            .map(|json| serde_json::from_str(&json).map_err(Into::into))
            .transpose()
    }

    async fn load_document(&self, user_id: Uuid) -> AppResult<Option<UserHealthDocument>> {
        let document = sqlx::query_scalar::<_, String>(
            "SELECT document FROM health_documents WHERE user_id = $1",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        document
            .map(|json| serde_json::from_str(&json).map_err(Into::into))
            .transpose()
    }
}
