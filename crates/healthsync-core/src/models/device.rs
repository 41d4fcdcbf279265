// ABOUTME: Per-user document holding device connection state and merged canonical data
// ABOUTME: Device sources are normalized lowercase identifiers such as "oura" or "garmin"
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::canonical::{
    ActivityEvent, BodyRecord, CanonicalRecord, HealthCategory, PhysicalRecord, SleepRecord,
};
use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Maximum length of a device source identifier
const MAX_DEVICE_SOURCE_LEN: usize = 64;

/// Validated device source identifier
///
/// Used as a key inside the user document, so only `[a-z0-9_-]` is allowed.
/// Provider display names ("Oura", "Apple Health") are normalized by
/// lowercasing and replacing spaces with underscores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceSource(String);

impl DeviceSource {
    /// Normalize and validate a device source
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the value is empty, too long, or contains
    /// characters outside `[a-z0-9_-]` after normalization
    pub fn parse(raw: &str) -> AppResult<Self> {
        let normalized = raw.trim().to_lowercase().replace([' ', '.'], "_");
        let valid = !normalized.is_empty()
            && normalized.len() <= MAX_DEVICE_SOURCE_LEN
            && normalized
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

        if valid {
            Ok(Self(normalized))
        } else {
            Err(AppError::invalid_format(format!(
                "Malformed device source: {raw:?}"
            )))
        }
    }

    /// Borrow the normalized identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DeviceSource {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DeviceSource> for String {
    fn from(value: DeviceSource) -> Self {
        value.0
    }
}

impl fmt::Display for DeviceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The four canonical categories stored for one device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceData {
    /// Sleep summary
    pub sleep: Option<SleepRecord>,
    /// Physical summary
    pub physical: Option<PhysicalRecord>,
    /// Body summary
    pub body: Option<BodyRecord>,
    /// Activity events, newest first
    #[serde(default)]
    pub activity_events: Vec<ActivityEvent>,
}

impl DeviceData {
    /// Current record for a category, if any
    #[must_use]
    pub fn get(&self, category: HealthCategory) -> Option<CanonicalRecord> {
        match category {
            HealthCategory::Sleep => self.sleep.clone().map(CanonicalRecord::Sleep),
            HealthCategory::Physical => self.physical.clone().map(CanonicalRecord::Physical),
            HealthCategory::Body => self.body.clone().map(CanonicalRecord::Body),
            HealthCategory::ActivityEvents => (!self.activity_events.is_empty())
                .then(|| CanonicalRecord::ActivityEvents(self.activity_events.clone())),
        }
    }

    /// Replace the record of the record's category
    pub fn set(&mut self, record: CanonicalRecord) {
        match record {
            CanonicalRecord::Sleep(sleep) => self.sleep = Some(sleep),
            CanonicalRecord::Physical(physical) => self.physical = Some(physical),
            CanonicalRecord::Body(body) => self.body = Some(body),
            CanonicalRecord::ActivityEvents(events) => self.activity_events = events,
        }
    }
}

/// Connect/revoke notification action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionAction {
    /// User authorized the device
    Connected,
    /// User revoked the device
    Revoked,
}

/// Connection state change carried by a notification webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionUpdate {
    /// What happened
    pub action: ConnectionAction,
    /// When the provider says it happened
    pub at: DateTime<Utc>,
}

/// Connection status and merged data for one device of one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConnection {
    /// Whether the device is currently connected
    pub connected: bool,
    /// Last successful data merge
    pub last_sync: Option<DateTime<Utc>>,
    /// Last connect notification
    pub connected_at: Option<DateTime<Utc>>,
    /// Last revoke notification
    pub revoked_at: Option<DateTime<Utc>>,
    /// Canonical data per category
    #[serde(default)]
    pub data: DeviceData,
}

impl DeviceConnection {
    /// Apply a connect/revoke notification.
    ///
    /// Notifications older than the latest one already applied are ignored,
    /// so out-of-order delivery cannot flip the state backwards. Returns
    /// whether the state changed.
    pub fn apply_connection_update(&mut self, update: ConnectionUpdate) -> bool {
        let latest = self.connected_at.max(self.revoked_at);
        if latest.is_some_and(|latest| update.at < latest) {
            return false;
        }

        match update.action {
            ConnectionAction::Connected => {
                self.connected = true;
                self.connected_at = Some(update.at);
            }
            ConnectionAction::Revoked => {
                self.connected = false;
                self.revoked_at = Some(update.at);
            }
        }
        true
    }

    /// Side effects of a successful data write
    pub fn record_sync(&mut self, synced_at: DateTime<Utc>) {
        self.connected = true;
        self.last_sync = Some(synced_at);
    }
}

/// One document per user: device source -> connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserHealthDocument {
    /// Local user id
    pub user_id: Uuid,
    /// Devices keyed by normalized source
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceConnection>,
}

impl UserHealthDocument {
    /// Empty document for a user
    #[must_use]
    pub const fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            devices: BTreeMap::new(),
        }
    }

    /// Connection for a device, if the document has one
    #[must_use]
    pub fn device(&self, source: &DeviceSource) -> Option<&DeviceConnection> {
        self.devices.get(source.as_str())
    }

    /// Connection for a device, created on first use
    pub fn device_mut(&mut self, source: &DeviceSource) -> &mut DeviceConnection {
        self.devices.entry(source.as_str().to_owned()).or_default()
    }
}
