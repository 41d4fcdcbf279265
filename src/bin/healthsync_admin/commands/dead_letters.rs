// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
// ABOUTME: Dead-letter channel commands: list parked messages, redrive one, show depth
// ABOUTME: Operates on whichever queue backend the configuration selects

use crate::helpers::display;
use anyhow::Result;
use healthsync_server::queue::MessageQueue;

/// Show dead-lettered messages, oldest first
pub async fn list(queue: &dyn MessageQueue, limit: u32) -> Result<()> {
    let dead_letters = queue.dead_letters(limit).await?;
    display::display_dead_letters(&dead_letters);
    Ok(())
}

/// Move one message back to the queue
pub async fn redrive(queue: &dyn MessageQueue, message_id: &str) -> Result<()> {
    queue.redrive(message_id).await?;
    println!("Message {message_id} moved back to the queue");
    Ok(())
}

/// Show queue depth
pub async fn depth(queue: &dyn MessageQueue) -> Result<()> {
    let depth = queue.depth().await?;
    println!("{}", serde_json::to_string_pretty(&depth)?);
    Ok(())
}
