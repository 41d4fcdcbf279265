// ABOUTME: ROOK payload paths and field names used by routing and schema transformation
// ABOUTME: Keeps provider-specific JSON keys out of the conversion logic
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! ROOK payload constants
//!
//! ROOK field names carry their unit and type as a suffix
//! (`sleep_duration_seconds_int`, `weight_kg_float`). Providers behind ROOK
//! are inconsistent about the JSON type actually sent, so the suffix is only
//! a hint; see `super::fields` for the tolerant readers.

// =============================================================================
// Envelope
// =============================================================================

/// Provider user id (the local user id registered with ROOK)
pub const USER_ID: &str = "user_id";

/// Payload shape tag
pub const DATA_STRUCTURE: &str = "data_structure";

/// Explicit data source (device) name
pub const DATA_SOURCE: &str = "data_source";

/// Metadata object present on every summary and event
pub const METADATA: &str = "metadata";

/// Provider timestamp inside `metadata`
pub const DATETIME_STRING: &str = "datetime_string";

/// Data sources inside `metadata`
pub const SOURCES_OF_DATA: &str = "sources_of_data_array";

// =============================================================================
// Category paths
// =============================================================================

/// Sleep summary location
pub const SLEEP_SUMMARY_PATH: [&str; 3] = ["sleep_health", "summary", "sleep_summary"];

/// Physical summary location
pub const PHYSICAL_SUMMARY_PATH: [&str; 3] = ["physical_health", "summary", "physical_summary"];

/// Body summary location
pub const BODY_SUMMARY_PATH: [&str; 3] = ["body_health", "summary", "body_summary"];

/// Activity event list location
pub const ACTIVITY_EVENT_PATH: [&str; 3] = ["physical_health", "events", "activity_event"];

// =============================================================================
// Connection notifications
// =============================================================================

/// Whether the user authorized (true) or revoked (false) the data source
pub const AUTHORIZED: &str = "authorized";

/// Alternate spelling some notification versions use
pub const AUTHORIZATION_STATUS: &str = "authorization_status";

/// Notification timestamp
pub const TIMESTAMP: &str = "timestamp";
