// ABOUTME: Storage abstractions for raw webhooks, canonical per-user state, and the user directory
// ABOUTME: Implemented by the SQLite database and by in-memory backends for tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Storage
//!
//! Components receive these as `Arc<dyn Trait>` handles so the ingress
//! service, the worker, and the replay tooling can run against `SQLite` in
//! production and against [`memory`] backends in tests.
//!
//! Errors follow the pipeline's classification: connectivity problems map
//! to transient [`ErrorCode`](crate::errors::ErrorCode)s so the worker leaves
//! the message for redelivery.

/// In-memory backends
pub mod memory;

use crate::errors::AppResult;
use crate::models::{
    CanonicalRecord, ConnectionUpdate, DeviceConnection, DeviceSource, HealthCategory,
    NewRawWebhook, RawWebhook, UserHealthDocument,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::{
    InMemoryCanonicalStore, InMemoryRawWebhookStore, InMemoryUserDirectory, InMemoryStoreHealth,
};

/// Append-only audit log of received webhooks
#[async_trait]
pub trait RawWebhookStore: Send + Sync {
    /// Persist a new row with `processed=false`, returning its id
    async fn record(&self, webhook: NewRawWebhook) -> AppResult<Uuid>;

    /// Store the queue correlation id on a row
    async fn link_queue_message(&self, id: Uuid, queue_message_id: &str) -> AppResult<()>;

    /// Terminal outcome: `processed=true`, `processed_at=now`, `error` as given
    async fn mark_processed(&self, id: Uuid, error: Option<&str>) -> AppResult<()>;

    /// Record an error while leaving the row unprocessed (dead-lettered)
    async fn mark_failed(&self, id: Uuid, error: &str) -> AppResult<()>;

    /// Fetch one row
    async fn get(&self, id: Uuid) -> AppResult<Option<RawWebhook>>;

    /// Oldest unprocessed rows, optionally only those received before `received_before`
    async fn find_unprocessed(
        &self,
        limit: u32,
        received_before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<RawWebhook>>;

    /// Oldest rows carrying an error
    async fn find_failed(&self, limit: u32) -> AppResult<Vec<RawWebhook>>;
}

/// Per-user canonical document store with single-path atomic updates
#[async_trait]
pub trait CanonicalStateStore: Send + Sync {
    /// Stored record for one (user, device, category)
    async fn load_category(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
        category: HealthCategory,
    ) -> AppResult<Option<CanonicalRecord>>;

    /// Atomically write one category and stamp `last_sync` / `connected=true`
    ///
    /// Compare-and-set: the write only happens while the stored category
    /// still equals `expected` (what the caller loaded and merged into).
    /// Returns `false`, writing nothing, when another writer got there first.
    async fn store_category(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
        expected: Option<&CanonicalRecord>,
        record: &CanonicalRecord,
        synced_at: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Apply a connect/revoke notification; returns whether the state changed
    async fn apply_connection_update(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
        update: ConnectionUpdate,
    ) -> AppResult<bool>;

    /// One device of one user
    async fn load_device(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
    ) -> AppResult<Option<DeviceConnection>>;

    /// The whole user document
    async fn load_document(&self, user_id: Uuid) -> AppResult<Option<UserHealthDocument>>;
}

/// Connectivity probe backing the readiness endpoint
#[async_trait]
pub trait StoreHealth: Send + Sync {
    /// Succeeds when the store can serve requests
    async fn ping(&self) -> AppResult<()>;
}

/// "Does this local user exist"
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Whether the user exists
    async fn user_exists(&self, user_id: Uuid) -> AppResult<bool>;

    /// Register a user (seeding and tests)
    async fn register_user(&self, user_id: Uuid) -> AppResult<()>;
}
