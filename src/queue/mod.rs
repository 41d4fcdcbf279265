// ABOUTME: Durable at-least-once message queue between webhook ingress and the consumer worker
// ABOUTME: Visibility timeouts, receive counts, and a dead-letter channel with redrive support
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Message Queue
//!
//! Semantics shared by every backend:
//!
//! - `receive` hides each returned message for the visibility timeout and
//!   increments its receive count. A message that is not deleted before the
//!   timeout expires becomes visible again (crash recovery).
//! - A visible message whose receive count already reached
//!   `max_receive_count` is moved to the dead-letter channel instead of
//!   being delivered again.
//! - Receipt handles identify one delivery. Deleting with a handle from an
//!   earlier delivery is a no-op, so a slow consumer cannot remove a message
//!   that was handed to someone else in the meantime.

/// In-process backend
pub mod memory;
/// `SQLite` backend shared across processes
pub mod sqlite;

use crate::config::{QueueBackend, QueueConfig};
use crate::database::Database;
use crate::errors::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub use memory::InMemoryQueue;
pub use sqlite::SqliteQueue;

/// Reason recorded when the receive bound moves a message aside
pub const MAX_RECEIVE_COUNT_EXCEEDED: &str = "max receive count exceeded";

/// One delivery of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Stable message id
    pub id: String,
    /// Handle for this delivery only
    pub receipt_handle: String,
    /// Message body
    pub body: String,
    /// Deliveries so far, including this one
    pub receive_count: u32,
}

/// A message parked in the dead-letter channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Original message id
    pub id: String,
    /// Message body
    pub body: String,
    /// Deliveries before it was parked
    pub receive_count: u32,
    /// Why it was parked
    pub reason: String,
    /// When it was parked
    pub dead_lettered_at: DateTime<Utc>,
}

/// Queue depth snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepth {
    /// Messages ready for delivery
    pub visible: u64,
    /// Messages received and not yet deleted
    pub in_flight: u64,
    /// Messages in the dead-letter channel
    pub dead_lettered: u64,
}

/// At-least-once message queue
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Append a message, returning its id
    async fn enqueue(&self, body: &str) -> AppResult<String>;

    /// Claim up to `max` visible messages, waiting up to `wait` for the first
    async fn receive(&self, max: u32, wait: Duration) -> AppResult<Vec<ReceivedMessage>>;

    /// Acknowledge a delivery; stale handles are ignored
    async fn delete(&self, receipt_handle: &str) -> AppResult<()>;

    /// Move a delivered message to the dead-letter channel now
    async fn dead_letter(&self, receipt_handle: &str, reason: &str) -> AppResult<()>;

    /// Oldest dead-lettered messages first
    async fn dead_letters(&self, limit: u32) -> AppResult<Vec<DeadLetter>>;

    /// Move a dead-lettered message back to the queue with a fresh receive count
    async fn redrive(&self, message_id: &str) -> AppResult<()>;

    /// Current depth
    async fn depth(&self) -> AppResult<QueueDepth>;
}

/// Build the configured backend
///
/// # Errors
///
/// Returns an error if the `SQLite` queue tables cannot be created
pub async fn from_config(
    config: &QueueConfig,
    database: &Database,
) -> AppResult<Arc<dyn MessageQueue>> {
    Ok(match config.backend {
        QueueBackend::Memory => Arc::new(InMemoryQueue::new(config)),
        QueueBackend::Sqlite => Arc::new(SqliteQueue::new(database.pool().clone(), config).await?),
    })
}
