// ABOUTME: Local user directory table consulted by ingress to route webhooks
// ABOUTME: Only existence matters to the pipeline; profiles live in other services

use super::{format_timestamp, Database};
use crate::errors::AppResult;
use crate::storage::UserDirectory;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

impl Database {
    /// Create the `users` table
    pub(super) async fn migrate_users(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl UserDirectory for Database {
    async fn user_exists(&self, user_id: Uuid) -> AppResult<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM users WHERE id = $1")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }

    async fn register_user(&self, user_id: Uuid) -> AppResult<()> {
        sqlx::query("INSERT OR IGNORE INTO users (id, created_at) VALUES ($1, $2)")
            .bind(user_id.to_string())
            .bind(format_timestamp(Utc::now()))
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
