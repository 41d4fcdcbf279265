// ABOUTME: Re-enqueues raw webhooks that never reached a terminal state or failed
// ABOUTME: Routing is re-run on the stored payload so replay matches what ingress would do today
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Replay
//!
//! The raw webhook table is the source of truth. Rows stay `processed=false`
//! when enqueue failed at ingress or when a message was dead-lettered, and
//! rows carry an `error` when processing failed. [`ReplayService`] builds
//! fresh queue messages for such rows.
//!
//! Replaying is safe to repeat: merges are recency guarded, so a row that
//! is processed twice produces the same canonical state.

use crate::errors::AppResult;
use crate::ingress::enqueue_and_link;
use crate::models::{DataStructure, DeviceSource, QueueMessage, RawWebhook};
use crate::queue::MessageQueue;
use crate::storage::RawWebhookStore;
use chrono::{DateTime, Utc};
use healthsync_providers::rook::routing::{
    resolve_device_source, resolve_external_user_id, resolve_user_id,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Summary of one replay run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Rows examined
    pub scanned: usize,
    /// Rows re-enqueued
    pub enqueued: usize,
    /// Rows that can no longer be routed, with the reason
    pub skipped: Vec<SkippedRow>,
    /// Rows whose enqueue failed
    pub failed: usize,
}

/// A row replay could not rebuild a message for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    /// Raw webhook id
    pub raw_webhook_id: Uuid,
    /// Why
    pub reason: String,
}

/// Rebuilds queue messages from raw webhook rows
pub struct ReplayService {
    raw_webhooks: Arc<dyn RawWebhookStore>,
    queue: Arc<dyn MessageQueue>,
}

impl ReplayService {
    /// Create the service
    #[must_use]
    pub fn new(raw_webhooks: Arc<dyn RawWebhookStore>, queue: Arc<dyn MessageQueue>) -> Self {
        Self {
            raw_webhooks,
            queue,
        }
    }

    /// Re-enqueue up to `limit` unprocessed rows, optionally only those
    /// received before `older_than`
    ///
    /// # Errors
    ///
    /// Returns an error if the raw webhook store cannot be queried
    pub async fn replay_unprocessed(
        &self,
        limit: u32,
        older_than: Option<DateTime<Utc>>,
    ) -> AppResult<ReplayReport> {
        let rows = self
            .raw_webhooks
            .find_unprocessed(limit, older_than)
            .await?;
        Ok(self.replay_rows(rows).await)
    }

    /// Re-enqueue up to `limit` rows that recorded an error
    ///
    /// # Errors
    ///
    /// Returns an error if the raw webhook store cannot be queried
    pub async fn replay_failed(&self, limit: u32) -> AppResult<ReplayReport> {
        let rows = self.raw_webhooks.find_failed(limit).await?;
        Ok(self.replay_rows(rows).await)
    }

    async fn replay_rows(&self, rows: Vec<RawWebhook>) -> ReplayReport {
        let mut report = ReplayReport {
            scanned: rows.len(),
            ..ReplayReport::default()
        };

        for row in rows {
            let message = match rebuild_message(&row) {
                Ok(message) => message,
                Err(reason) => {
                    warn!(raw_webhook_id = %row.id, reason = %reason, "Skipping raw webhook during replay");
                    report.skipped.push(SkippedRow {
                        raw_webhook_id: row.id,
                        reason,
                    });
                    continue;
                }
            };

            match enqueue_and_link(self.queue.as_ref(), self.raw_webhooks.as_ref(), &message).await
            {
                Ok(_) => report.enqueued += 1,
                Err(e) => {
                    warn!(raw_webhook_id = %row.id, error = %e, "Replay enqueue failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            enqueued = report.enqueued,
            skipped = report.skipped.len(),
            failed = report.failed,
            "Replay finished"
        );
        report
    }
}

/// Rebuild the queue message ingress would have produced for a stored row
///
/// # Errors
///
/// Returns the reason when the row can no longer be routed
pub fn rebuild_message(row: &RawWebhook) -> Result<QueueMessage, String> {
    let external_user_id =
        resolve_external_user_id(&row.payload).unwrap_or_else(|| row.external_user_id.clone());
    let user_id = resolve_user_id(&external_user_id)
        .ok_or_else(|| format!("user reference {external_user_id:?} is not a valid id"))?;

    let source = resolve_device_source(DataStructure::parse(&row.data_structure), &row.payload)
        .ok_or_else(|| "payload has no device source".to_owned())?;
    let device_source = DeviceSource::parse(&source).map_err(|e| e.message)?;

    Ok(QueueMessage {
        raw_webhook_id: row.id,
        user_id: user_id.to_string(),
        device_source: device_source.to_string(),
        data_structure: row.data_structure.clone(),
        payload: row.payload.clone(),
        received_at: row.received_at,
    })
}
