// ABOUTME: Provider webhook integrations for the HealthSync ingestion pipeline
// ABOUTME: Currently the ROOK aggregation provider: signatures, routing, and schema transforms
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! Provider integrations.
//!
//! Everything here is synchronous and I/O free: the server crate owns
//! persistence and queueing, providers only interpret bytes and JSON.

// Re-export core modules so provider code can use `crate::errors::*`
pub use healthsync_core::constants;
pub use healthsync_core::errors;
pub use healthsync_core::models;

/// ROOK wearable aggregation provider
pub mod rook;

pub use rook::{RookTransformer, SignatureValidation, SignatureVerifier, WebhookKind};
