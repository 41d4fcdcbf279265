// ABOUTME: SQLite-backed durable queue shared by the ingress server and worker processes
// ABOUTME: Messages are claimed atomically with UPDATE ... RETURNING and parked in a dead-letter table

use super::{
    DeadLetter, MessageQueue, QueueDepth, ReceivedMessage, MAX_RECEIVE_COUNT_EXCEEDED,
};
use crate::config::QueueConfig;
use crate::constants::queue::LONG_POLL_INTERVAL_MS;
use crate::database::{format_timestamp, parse_timestamp};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Queue stored in the `queue_messages` and `queue_dead_letters` tables
#[derive(Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
    visibility_timeout_ms: i64,
    max_receive_count: u32,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl SqliteQueue {
    /// Create the queue tables if needed
    ///
    /// # Errors
    ///
    /// Returns an error if table creation fails
    pub async fn new(pool: SqlitePool, config: &QueueConfig) -> AppResult<Self> {
        let queue = Self {
            pool,
            visibility_timeout_ms: i64::try_from(config.visibility_timeout().as_millis())
                .unwrap_or(i64::MAX),
            max_receive_count: config.max_receive_count,
        };
        queue.migrate().await?;
        Ok(queue)
    }

    async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS queue_messages (
                id TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                receive_count INTEGER NOT NULL DEFAULT 0,
                visible_at INTEGER NOT NULL,
                receipt_handle TEXT,
                enqueued_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_queue_messages_visible ON queue_messages(visible_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS queue_dead_letters (
                id TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                receive_count INTEGER NOT NULL,
                reason TEXT NOT NULL,
                enqueued_at TEXT NOT NULL,
                dead_lettered_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim(&self, max: u32) -> AppResult<Vec<ReceivedMessage>> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;

        let parked = sqlx::query(
            r"
            INSERT OR REPLACE INTO queue_dead_letters (id, body, receive_count, reason, enqueued_at, dead_lettered_at)
            SELECT id, body, receive_count, $1, enqueued_at, $2
            FROM queue_messages
            WHERE visible_at <= $3 AND receive_count >= $4
            ",
        )
        .bind(MAX_RECEIVE_COUNT_EXCEEDED)
        .bind(format_timestamp(Utc::now()))
        .bind(now)
        .bind(i64::from(self.max_receive_count))
        .execute(&mut *tx)
        .await?;

        if parked.rows_affected() > 0 {
            sqlx::query("DELETE FROM queue_messages WHERE visible_at <= $1 AND receive_count >= $2")
                .bind(now)
                .bind(i64::from(self.max_receive_count))
                .execute(&mut *tx)
                .await?;
            warn!(
                queue.dead_lettered = parked.rows_affected(),
                "Dead-lettered exhausted messages"
            );
        }

        let rows = sqlx::query(
            r"
            UPDATE queue_messages
            SET receive_count = receive_count + 1,
                visible_at = $1,
                receipt_handle = id || ':' || (receive_count + 1) || ':' || lower(hex(randomblob(8)))
            WHERE id IN (
                SELECT id FROM queue_messages WHERE visible_at <= $2 ORDER BY rowid LIMIT $3
            )
            RETURNING id, receipt_handle, body, receive_count
            ",
        )
        .bind(now.saturating_add(self.visibility_timeout_ms))
        .bind(now)
        .bind(i64::from(max))
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        rows.iter()
            .map(|row| -> AppResult<ReceivedMessage> {
                Ok(ReceivedMessage {
                    id: row.try_get("id")?,
                    receipt_handle: row.try_get("receipt_handle")?,
                    body: row.try_get("body")?,
                    receive_count: u32::try_from(row.try_get::<i64, _>("receive_count")?)
                        .unwrap_or(u32::MAX),
                })
            })
            .collect()
    }
}

#[async_trait]
impl MessageQueue for SqliteQueue {
    async fn enqueue(&self, body: &str) -> AppResult<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r"
            INSERT INTO queue_messages (id, body, receive_count, visible_at, enqueued_at)
            VALUES ($1, $2, 0, $3, $4)
            ",
        )
        .bind(&id)
        .bind(body)
        .bind(now_millis())
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn receive(&self, max: u32, wait: Duration) -> AppResult<Vec<ReceivedMessage>> {
        let deadline = Instant::now() + wait;
        let poll_interval = Duration::from_millis(LONG_POLL_INTERVAL_MS);

        loop {
            let messages = self.claim(max.max(1)).await?;
            let now = Instant::now();
            if !messages.is_empty() || now >= deadline {
                return Ok(messages);
            }
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }

    async fn delete(&self, receipt_handle: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM queue_messages WHERE receipt_handle = $1")
            .bind(receipt_handle)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!(queue.receipt = %receipt_handle, "Delete ignored for stale receipt");
        }
        Ok(())
    }

    async fn dead_letter(&self, receipt_handle: &str, reason: &str) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let parked = sqlx::query(
            r"
            INSERT OR REPLACE INTO queue_dead_letters (id, body, receive_count, reason, enqueued_at, dead_lettered_at)
            SELECT id, body, receive_count, $1, enqueued_at, $2
            FROM queue_messages
            WHERE receipt_handle = $3
            ",
        )
        .bind(reason)
        .bind(format_timestamp(Utc::now()))
        .bind(receipt_handle)
        .execute(&mut *tx)
        .await?;

        if parked.rows_affected() == 0 {
            debug!(queue.receipt = %receipt_handle, "Dead-letter ignored for stale receipt");
            return Ok(());
        }

        sqlx::query("DELETE FROM queue_messages WHERE receipt_handle = $1")
            .bind(receipt_handle)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn dead_letters(&self, limit: u32) -> AppResult<Vec<DeadLetter>> {
        let rows = sqlx::query(
            r"
            SELECT id, body, receive_count, reason, dead_lettered_at
            FROM queue_dead_letters
            ORDER BY dead_lettered_at
            LIMIT $1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> AppResult<DeadLetter> {
                let dead_lettered_at: String = row.try_get("dead_lettered_at")?;
                Ok(DeadLetter {
                    id: row.try_get("id")?,
                    body: row.try_get("body")?,
                    receive_count: u32::try_from(row.try_get::<i64, _>("receive_count")?)
                        .unwrap_or(u32::MAX),
                    reason: row.try_get("reason")?,
                    dead_lettered_at: parse_timestamp("dead_lettered_at", &dead_lettered_at)?,
                })
            })
            .collect()
    }

    async fn redrive(&self, message_id: &str) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let restored = sqlx::query(
            r"
            INSERT INTO queue_messages (id, body, receive_count, visible_at, enqueued_at)
            SELECT id, body, 0, $1, enqueued_at
            FROM queue_dead_letters
            WHERE id = $2
            ",
        )
        .bind(now_millis())
        .bind(message_id)
        .execute(&mut *tx)
        .await?;

        if restored.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "Dead-lettered message {message_id}"
            )));
        }

        sqlx::query("DELETE FROM queue_dead_letters WHERE id = $1")
            .bind(message_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn depth(&self) -> AppResult<QueueDepth> {
        let row = sqlx::query(
            r"
            SELECT
                (SELECT COUNT(*) FROM queue_messages WHERE visible_at <= $1) AS visible,
                (SELECT COUNT(*) FROM queue_messages WHERE visible_at > $1) AS in_flight,
                (SELECT COUNT(*) FROM queue_dead_letters) AS dead_lettered
            ",
        )
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await?;

        let count = |column: &str| -> AppResult<u64> {
            Ok(u64::try_from(row.try_get::<i64, _>(column)?).unwrap_or_default())
        };

        Ok(QueueDepth {
            visible: count("visible")?,
            in_flight: count("in_flight")?,
            dead_lettered: count("dead_lettered")?,
        })
    }
}
