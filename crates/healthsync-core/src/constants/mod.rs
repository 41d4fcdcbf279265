// ABOUTME: Constants module with domain-separated organization
// ABOUTME: Pure data constants for webhook routing, queue defaults, and canonical limits
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Constants module
//!
//! Constants are grouped by domain rather than collected in one flat list.

/// Queue and worker defaults (visibility timeout, delivery bound, polling)
pub mod queue;

/// Provider identifiers accepted in webhook routes
pub mod providers {
    /// ROOK wearable aggregation provider
    pub const ROOK: &str = "rook";
}

/// Payload shape tags (`data_structure` values)
pub mod data_structures {
    /// Nightly sleep summary
    pub const SLEEP_SUMMARY: &str = "sleep_summary";
    /// Daily physical activity summary
    pub const PHYSICAL_SUMMARY: &str = "physical_summary";
    /// Body composition and vitals summary
    pub const BODY_SUMMARY: &str = "body_summary";
    /// Discrete workout/activity events
    pub const ACTIVITY_EVENT: &str = "activity_event";
    /// Device connect/revoke notification
    pub const CONNECTION_UPDATE: &str = "connection_update";
}

/// HTTP header names and formats
pub mod headers {
    /// Signature header sent by ROOK (`sha256=<hex>`)
    pub const ROOK_SIGNATURE: &str = "x-rook-hash";
    /// Prefix of the signature header value
    pub const SIGNATURE_PREFIX: &str = "sha256=";
    /// Request correlation header
    pub const REQUEST_ID: &str = "x-request-id";
}

/// Canonical record limits
pub mod limits {
    /// Maximum activity events kept per device
    pub const MAX_ACTIVITY_EVENTS: usize = 50;
    /// Maximum accepted webhook body size in bytes
    pub const MAX_WEBHOOK_BODY_BYTES: usize = 2_097_152; // 2MB
    /// Default number of raw rows handled by one replay run
    pub const DEFAULT_REPLAY_LIMIT: u32 = 100;
    /// Seconds per minute, for provider duration conversion
    pub const SECONDS_PER_MINUTE: f64 = 60.0;
}

/// Network ports
pub mod ports {
    /// Default HTTP port for the ingress server
    pub const DEFAULT_HTTP_PORT: u16 = 8081;
}

/// Service names used in structured logs
pub mod service_names {
    /// Ingress HTTP server
    pub const HEALTHSYNC_SERVER: &str = "healthsync-server";
    /// Queue consumer worker
    pub const HEALTHSYNC_WORKER: &str = "healthsync-worker";
    /// Operator CLI
    pub const HEALTHSYNC_ADMIN: &str = "healthsync-admin";
}
