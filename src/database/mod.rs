// ABOUTME: SQLite persistence for raw webhooks, user documents, and the user directory
// ABOUTME: Owns the connection pool and runs in-code CREATE TABLE IF NOT EXISTS migrations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Database Management
//!
//! A single `SQLite` pool backs every durable store of the pipeline. The
//! [`Database`] handle implements [`RawWebhookStore`](crate::storage::RawWebhookStore),
//! [`CanonicalStateStore`](crate::storage::CanonicalStateStore) and
//! [`UserDirectory`](crate::storage::UserDirectory); the durable queue in
//! [`crate::queue::SqliteQueue`] shares the same pool so ingress and worker
//! processes can coordinate through one file.
//!
//! Timestamps are stored as RFC 3339 text with a fixed microsecond precision
//! so that string comparison in SQL matches chronological order.

mod canonical;
mod raw_webhooks;
mod users;

use crate::errors::{AppError, AppResult};
use crate::storage::StoreHealth;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// How long a connection waits on a locked database before reporting busy
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database manager shared by the HTTP server, the worker, and the admin CLI
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect and run migrations
    ///
    /// `sqlite::memory:` databases are private to a connection, so the pool
    /// is pinned to one long-lived connection in that case.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the file cannot be opened, or
    /// a migration fails
    pub async fn new(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(database_url)
                .await?
        } else {
            let options = SqliteConnectOptions::from_str(database_url)?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(BUSY_TIMEOUT);
            if let Some(parent) = options.get_filename().parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::storage_unavailable(format!(
                        "Cannot create database directory {}",
                        parent.display()
                    ))
                    .with_source(e)
                })?;
            }

            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect_with(options)
                .await?
        };

        let db = Self { pool };
        db.migrate().await?;

        info!(database.url = %database_url, "Database ready");
        Ok(db)
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Connectivity probe used by `/ready`
    ///
    /// # Errors
    ///
    /// Returns a transient error if the database cannot be reached
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Run database migrations
    ///
    /// # Errors
    ///
    /// Returns an error if any table or index cannot be created
    pub async fn migrate(&self) -> AppResult<()> {
        self.migrate_raw_webhooks().await?;
        self.migrate_users().await?;
        self.migrate_health_documents().await?;
        Ok(())
    }
}

#[async_trait]
impl StoreHealth for Database {
    async fn ping(&self) -> AppResult<()> {
        Self::ping(self).await
    }
}

/// Fixed-width UTC text representation used for every stored timestamp
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp written by [`format_timestamp`]
pub(crate) fn parse_timestamp(column: &str, value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| {
            AppError::serialization(format!("Invalid timestamp in column {column}: {value}"))
                .with_source(e)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamps_sort_as_text() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).single();
        let later = earlier.map(|at| at + chrono::Duration::milliseconds(5));
        let (Some(earlier), Some(later)) = (earlier, later) else {
            return;
        };

        let (a, b) = (format_timestamp(earlier), format_timestamp(later));
        assert!(a < b);
        assert_eq!(a, "2024-01-01T08:00:00.000000Z");
        assert_eq!(parse_timestamp("received_at", &a).ok(), Some(earlier));
    }
}
