// ABOUTME: Raw webhook audit rows and queue message envelopes
// ABOUTME: Raw payloads are stored verbatim; only status fields change after processing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::canonical::HealthCategory;
use crate::constants::data_structures;
use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Recognised payload shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStructure {
    /// `sleep_summary`
    SleepSummary,
    /// `physical_summary`
    PhysicalSummary,
    /// `body_summary`
    BodySummary,
    /// `activity_event`
    ActivityEvent,
    /// `connection_update` (notification webhooks)
    ConnectionUpdate,
}

impl DataStructure {
    /// Parse a `data_structure` tag; unknown tags yield `None`
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            data_structures::SLEEP_SUMMARY => Some(Self::SleepSummary),
            data_structures::PHYSICAL_SUMMARY => Some(Self::PhysicalSummary),
            data_structures::BODY_SUMMARY => Some(Self::BodySummary),
            data_structures::ACTIVITY_EVENT => Some(Self::ActivityEvent),
            data_structures::CONNECTION_UPDATE => Some(Self::ConnectionUpdate),
            _ => None,
        }
    }

    /// Wire tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SleepSummary => data_structures::SLEEP_SUMMARY,
            Self::PhysicalSummary => data_structures::PHYSICAL_SUMMARY,
            Self::BodySummary => data_structures::BODY_SUMMARY,
            Self::ActivityEvent => data_structures::ACTIVITY_EVENT,
            Self::ConnectionUpdate => data_structures::CONNECTION_UPDATE,
        }
    }

    /// Canonical category produced by this shape; notifications produce none
    #[must_use]
    pub const fn category(self) -> Option<HealthCategory> {
        match self {
            Self::SleepSummary => Some(HealthCategory::Sleep),
            Self::PhysicalSummary => Some(HealthCategory::Physical),
            Self::BodySummary => Some(HealthCategory::Body),
            Self::ActivityEvent => Some(HealthCategory::ActivityEvents),
            Self::ConnectionUpdate => None,
        }
    }
}

impl fmt::Display for DataStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record of a received webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWebhook {
    /// Row id, referenced by queue messages
    pub id: Uuid,
    /// Provider name (e.g. "rook")
    pub provider: String,
    /// Provider-assigned user id, kept as received
    pub external_user_id: String,
    /// Payload shape tag, kept as received (may be unknown)
    pub data_structure: String,
    /// Payload exactly as received
    pub payload: serde_json::Value,
    /// Ingress time
    pub received_at: DateTime<Utc>,
    /// Whether processing reached a terminal outcome
    pub processed: bool,
    /// When processing reached a terminal outcome
    pub processed_at: Option<DateTime<Utc>>,
    /// Last processing error, if any
    pub error: Option<String>,
    /// Correlation id of the queue message
    pub queue_message_id: Option<String>,
}

/// Fields supplied by ingress when recording a webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRawWebhook {
    /// Provider name
    pub provider: String,
    /// Provider-assigned user id
    pub external_user_id: String,
    /// Payload shape tag
    pub data_structure: String,
    /// Payload exactly as received
    pub payload: serde_json::Value,
    /// Ingress time
    pub received_at: DateTime<Utc>,
}

impl NewRawWebhook {
    /// Materialize the row under its id
    #[must_use]
    pub fn into_raw(self, id: Uuid) -> RawWebhook {
        RawWebhook {
            id,
            provider: self.provider,
            external_user_id: self.external_user_id,
            data_structure: self.data_structure,
            payload: self.payload,
            received_at: self.received_at,
            processed: false,
            processed_at: None,
            error: None,
            queue_message_id: None,
        }
    }
}

/// Queue envelope referencing a raw webhook row
///
/// `user_id` and `device_source` are carried as strings and validated by the
/// worker: a malformed reference is a permanent failure, not a decode error
/// that would hide which raw row it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Raw webhook row this message was built from
    pub raw_webhook_id: Uuid,
    /// Local user id
    pub user_id: String,
    /// Device source
    pub device_source: String,
    /// Payload shape tag
    pub data_structure: String,
    /// Payload copy (the raw row stays the source of truth)
    pub payload: serde_json::Value,
    /// When ingress accepted the webhook; fallback time for undated notifications
    pub received_at: DateTime<Utc>,
}

impl QueueMessage {
    /// Encode as a queue body
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_body(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a queue body
    ///
    /// # Errors
    ///
    /// Returns `QueueMessageMalformed` if the body is not a valid envelope
    pub fn from_body(body: &str) -> AppResult<Self> {
        serde_json::from_str(body).map_err(|e| {
            AppError::malformed_message(format!("Undecodable queue message: {e}")).with_source(e)
        })
    }
}
