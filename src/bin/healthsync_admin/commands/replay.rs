// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
// ABOUTME: Replay commands re-enqueueing raw webhooks from the audit table
// ABOUTME: Covers rows that never reached a terminal state and rows that recorded an error

use crate::helpers::display;
use anyhow::{ensure, Result};
use chrono::{Duration, Utc};
use healthsync_server::{
    database::Database, queue::MessageQueue, replay::ReplayService, storage::RawWebhookStore,
};
use std::sync::Arc;

/// Replay unprocessed rows, optionally only those older than `older_than_minutes`
pub async fn unprocessed(
    database: &Arc<Database>,
    queue: Arc<dyn MessageQueue>,
    limit: u32,
    older_than_minutes: Option<i64>,
) -> Result<()> {
    if let Some(minutes) = older_than_minutes {
        ensure!(minutes >= 0, "--older-than-minutes must not be negative");
    }
    let older_than = older_than_minutes.map(|minutes| Utc::now() - Duration::minutes(minutes));

    let service = ReplayService::new(database.clone(), queue);
    let report = service.replay_unprocessed(limit, older_than).await?;
    display::display_replay_report("Unprocessed replay", &report);
    Ok(())
}

/// List rows with a recorded error, re-enqueueing them when `replay` is set
pub async fn failed(
    database: &Arc<Database>,
    queue: Arc<dyn MessageQueue>,
    limit: u32,
    replay: bool,
) -> Result<()> {
    let rows = database.find_failed(limit).await?;
    display::display_failed_rows(&rows);

    if replay && !rows.is_empty() {
        let service = ReplayService::new(database.clone(), queue);
        let report = service.replay_failed(limit).await?;
        display::display_replay_report("Failed replay", &report);
    }
    Ok(())
}
