// ABOUTME: Resolves data structure, device source, and user reference from ROOK payloads
// ABOUTME: Shared by ingress and replay so both route stored payloads identically
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::constants::{
    ACTIVITY_EVENT_PATH, BODY_SUMMARY_PATH, DATA_SOURCE, DATA_STRUCTURE, METADATA,
    PHYSICAL_SUMMARY_PATH, SLEEP_SUMMARY_PATH, SOURCES_OF_DATA, USER_ID,
};
use super::fields::FieldReader;
use healthsync_core::constants::data_structures::CONNECTION_UPDATE;
use healthsync_core::errors::{AppError, AppResult, ErrorCode};
use healthsync_core::models::{DataStructure, DeviceSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Which webhook endpoint a payload arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookKind {
    /// `POST /webhooks/{provider}/health-data`
    HealthData,
    /// `POST /webhooks/{provider}/notifications`
    Notification,
}

impl fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HealthData => f.write_str("health_data"),
            Self::Notification => f.write_str("notification"),
        }
    }
}

/// Routing facts extracted from a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedWebhook {
    /// Provider-supplied user id, unvalidated
    pub external_user_id: String,
    /// Payload shape tag as sent (may be unknown to the transformer)
    pub data_structure: String,
    /// Device the data came from
    pub device_source: DeviceSource,
}

/// Extract routing facts from a payload
///
/// # Errors
///
/// Returns `MissingRequiredField` when the user id, data structure, or device
/// source cannot be found, and `InvalidFormat` when the device source is not
/// a usable identifier
pub fn route(kind: WebhookKind, payload: &Value) -> AppResult<RoutedWebhook> {
    let external_user_id = resolve_external_user_id(payload)
        .ok_or_else(|| missing_field("user_id"))?;
    let data_structure =
        resolve_data_structure(kind, payload).ok_or_else(|| missing_field("data_structure"))?;
    let raw_source = resolve_device_source(DataStructure::parse(&data_structure), payload)
        .ok_or_else(|| missing_field("data_source"))?;
    let device_source = DeviceSource::parse(&raw_source)?;

    Ok(RoutedWebhook {
        external_user_id,
        data_structure,
        device_source,
    })
}

fn missing_field(field: &str) -> AppError {
    AppError::new(
        ErrorCode::MissingRequiredField,
        format!("ROOK payload has no usable {field}"),
    )
}

/// Provider user id: the top-level `user_id`, string or number
#[must_use]
pub fn resolve_external_user_id(payload: &Value) -> Option<String> {
    match payload.get(USER_ID)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Payload shape tag; notifications always carry connection updates
#[must_use]
pub fn resolve_data_structure(kind: WebhookKind, payload: &Value) -> Option<String> {
    match kind {
        WebhookKind::Notification => Some(CONNECTION_UPDATE.to_owned()),
        WebhookKind::HealthData => FieldReader::new(payload).text(&[DATA_STRUCTURE]),
    }
}

/// Raw device source name.
///
/// The explicit top-level `data_source` wins. Otherwise the first entry of
/// `metadata.sources_of_data_array` at the structure's nested location is
/// used; for unknown structures every known location is tried in turn.
#[must_use]
pub fn resolve_device_source(structure: Option<DataStructure>, payload: &Value) -> Option<String> {
    let fields = FieldReader::new(payload);
    if let Some(source) = fields.text(&[DATA_SOURCE]) {
        return Some(source);
    }

    let candidates: Vec<Option<&Value>> = match structure {
        Some(DataStructure::SleepSummary) => vec![fields.get(&SLEEP_SUMMARY_PATH)],
        Some(DataStructure::PhysicalSummary) => vec![fields.get(&PHYSICAL_SUMMARY_PATH)],
        Some(DataStructure::BodySummary) => vec![fields.get(&BODY_SUMMARY_PATH)],
        Some(DataStructure::ActivityEvent) => vec![first_event(&fields)],
        Some(DataStructure::ConnectionUpdate) => vec![],
        None => vec![
            fields.get(&SLEEP_SUMMARY_PATH),
            fields.get(&PHYSICAL_SUMMARY_PATH),
            fields.get(&BODY_SUMMARY_PATH),
            first_event(&fields),
        ],
    };

    candidates.into_iter().flatten().find_map(first_listed_source)
}

fn first_event<'a>(fields: &FieldReader<'a>) -> Option<&'a Value> {
    fields
        .get(&ACTIVITY_EVENT_PATH)
        .and_then(Value::as_array)
        .and_then(|events| events.first())
}

fn first_listed_source(section: &Value) -> Option<String> {
    let sources = FieldReader::new(section)
        .get(&[METADATA, SOURCES_OF_DATA])?
        .as_array()?;
    let names: Vec<&str> = sources
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if names.len() > 1 {
        debug!(sources = ?names, "Several data sources reported, using the first");
    }
    names.first().map(|s| (*s).to_owned())
}

/// Local user id referenced by a provider user id, when well-formed
#[must_use]
pub fn resolve_user_id(external_user_id: &str) -> Option<Uuid> {
    Uuid::parse_str(external_user_id.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_explicit_data_source_wins() {
        let payload = json!({
            "user_id": "u",
            "data_structure": "sleep_summary",
            "data_source": "Garmin",
            "sleep_health": {"summary": {"sleep_summary": {
                "metadata": {"sources_of_data_array": ["Oura"]}
            }}}
        });
        let routed = route(WebhookKind::HealthData, &payload).ok();
        assert_eq!(routed.map(|r| r.device_source.to_string()), Some("garmin".to_owned()));
    }

    #[test]
    fn test_nested_first_source_used() {
        let payload = json!({
            "user_id": "u",
            "data_structure": "activity_event",
            "physical_health": {"events": {"activity_event": [
                {"metadata": {"sources_of_data_array": ["Polar", "Apple Health"]}}
            ]}}
        });
        assert_eq!(
            resolve_device_source(Some(DataStructure::ActivityEvent), &payload),
            Some("Polar".to_owned())
        );
    }

    #[test]
    fn test_unknown_structure_searches_all_locations() {
        let payload = json!({
            "body_health": {"summary": {"body_summary": {
                "metadata": {"sources_of_data_array": ["Withings"]}
            }}}
        });
        assert_eq!(resolve_device_source(None, &payload), Some("Withings".to_owned()));
    }

    #[test]
    fn test_notification_structure() {
        let payload = json!({"user_id": "u", "data_source": "Oura", "authorized": true});
        let routed = route(WebhookKind::Notification, &payload).ok();
        assert_eq!(
            routed.map(|r| r.data_structure),
            Some("connection_update".to_owned())
        );
    }

    #[test]
    fn test_missing_user_id_fails() {
        let payload = json!({"data_structure": "sleep_summary", "data_source": "Oura"});
        assert!(route(WebhookKind::HealthData, &payload).is_err());
        assert_eq!(resolve_user_id("not-a-uuid"), None);
    }
}
