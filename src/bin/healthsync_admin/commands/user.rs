// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
// ABOUTME: User directory commands for healthsync-admin
// ABOUTME: Webhooks for unregistered users are dropped at ingress

use anyhow::Result;
use healthsync_server::{database::Database, storage::UserDirectory};
use uuid::Uuid;

/// Register `user_id`; registering twice is harmless
pub async fn register(database: &Database, user_id: Uuid) -> Result<()> {
    database.register_user(user_id).await?;
    println!("User {user_id} registered");
    Ok(())
}
