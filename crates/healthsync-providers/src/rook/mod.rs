// ABOUTME: ROOK wearable aggregation provider integration
// ABOUTME: Webhook signature verification, payload routing, and schema transformation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! ROOK provider
//!
//! ROOK pushes normalized data from many wearables (Oura, Garmin, Polar,
//! Withings, Apple Health, ...) as signed webhooks. This module covers the
//! provider-specific parts of the pipeline:
//!
//! - [`signature`]: `X-ROOK-HASH` verification
//! - [`routing`]: which user, device, and data structure a payload is about
//! - [`transform`]: payload to canonical record conversion

/// Payload paths and field names
pub mod constants;
/// Tolerant JSON field readers
pub mod fields;
/// Payload routing
pub mod routing;
/// Webhook signature verification
pub mod signature;
/// Schema transformation
pub mod transform;

pub use routing::{route, resolve_user_id, RoutedWebhook, WebhookKind};
pub use signature::{SignatureValidation, SignatureVerifier};
pub use transform::RookTransformer;
