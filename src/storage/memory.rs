// ABOUTME: In-memory storage backends built on DashMap
// ABOUTME: Used by tests and single-process development setups
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{CanonicalStateStore, RawWebhookStore, StoreHealth, UserDirectory};
use crate::errors::{AppError, AppResult};
use crate::models::{
    CanonicalRecord, ConnectionUpdate, DeviceConnection, DeviceSource, HealthCategory,
    NewRawWebhook, RawWebhook, UserHealthDocument,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use uuid::Uuid;

/// Raw webhook rows keyed by id
#[derive(Debug, Default)]
pub struct InMemoryRawWebhookStore {
    rows: DashMap<Uuid, RawWebhook>,
}

impl InMemoryRawWebhookStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no row has been stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn update(&self, id: Uuid, apply: impl FnOnce(&mut RawWebhook)) -> AppResult<()> {
        let mut row = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Raw webhook {id}")))?;
        apply(&mut row);
        Ok(())
    }

    fn oldest(&self, limit: u32, keep: impl Fn(&RawWebhook) -> bool) -> Vec<RawWebhook> {
        let mut rows: Vec<RawWebhook> = self
            .rows
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.received_at);
        rows.truncate(limit as usize);
        rows
    }
}

#[async_trait]
impl RawWebhookStore for InMemoryRawWebhookStore {
    async fn record(&self, webhook: NewRawWebhook) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        self.rows.insert(id, webhook.into_raw(id));
        Ok(id)
    }

    async fn link_queue_message(&self, id: Uuid, queue_message_id: &str) -> AppResult<()> {
        self.update(id, |row| row.queue_message_id = Some(queue_message_id.to_owned()))
    }

    async fn mark_processed(&self, id: Uuid, error: Option<&str>) -> AppResult<()> {
        self.update(id, |row| {
            row.processed = true;
            row.processed_at = Some(Utc::now());
            row.error = error.map(str::to_owned);
        })
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> AppResult<()> {
        self.update(id, |row| row.error = Some(error.to_owned()))
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<RawWebhook>> {
        Ok(self.rows.get(&id).map(|row| row.clone()))
    }

    async fn find_unprocessed(
        &self,
        limit: u32,
        received_before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<RawWebhook>> {
        Ok(self.oldest(limit, |row| {
            !row.processed && received_before.is_none_or(|before| row.received_at < before)
        }))
    }

    async fn find_failed(&self, limit: u32) -> AppResult<Vec<RawWebhook>> {
        Ok(self.oldest(limit, |row| row.error.is_some()))
    }
}

/// One document per user, mutated under the `DashMap` entry lock
#[derive(Debug, Default)]
pub struct InMemoryCanonicalStore {
    documents: DashMap<Uuid, UserHealthDocument>,
}

impl InMemoryCanonicalStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CanonicalStateStore for InMemoryCanonicalStore {
    async fn load_category(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
        category: HealthCategory,
    ) -> AppResult<Option<CanonicalRecord>> {
        Ok(self.documents.get(&user_id).and_then(|doc| {
            doc.device(device)
                .and_then(|connection| connection.data.get(category))
        }))
    }

    async fn store_category(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
        expected: Option<&CanonicalRecord>,
        record: &CanonicalRecord,
        synced_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut doc = self
            .documents
            .entry(user_id)
            .or_insert_with(|| UserHealthDocument::new(user_id));
        let connection = doc.device_mut(device);
        if connection.data.get(record.category()).as_ref() != expected {
            return Ok(false);
        }
        connection.data.set(record.clone());
        connection.record_sync(synced_at);
        Ok(true)
    }

    async fn apply_connection_update(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
        update: ConnectionUpdate,
    ) -> AppResult<bool> {
        let mut doc = self
            .documents
            .entry(user_id)
            .or_insert_with(|| UserHealthDocument::new(user_id));
        Ok(doc.device_mut(device).apply_connection_update(update))
    }

    async fn load_device(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
    ) -> AppResult<Option<DeviceConnection>> {
        Ok(self
            .documents
            .get(&user_id)
            .and_then(|doc| doc.device(device).cloned()))
    }

    async fn load_document(&self, user_id: Uuid) -> AppResult<Option<UserHealthDocument>> {
        Ok(self.documents.get(&user_id).map(|doc| doc.clone()))
    }
}

/// Set of known user ids
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: DashSet<Uuid>,
}

impl InMemoryUserDirectory {
    /// Empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory pre-populated with users
    #[must_use]
    pub fn with_users(users: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            users: users.into_iter().collect(),
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn user_exists(&self, user_id: Uuid) -> AppResult<bool> {
        Ok(self.users.contains(&user_id))
    }

    async fn register_user(&self, user_id: Uuid) -> AppResult<()> {
        self.users.insert(user_id);
        Ok(())
    }
}

/// Always-ready probe for in-memory deployments
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryStoreHealth;

#[async_trait]
impl StoreHealth for InMemoryStoreHealth {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
