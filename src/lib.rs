// ABOUTME: Main library entry point for the HealthSync webhook ingestion pipeline
// ABOUTME: Wires ingress, durable queueing, the reconciliation worker, and replay tooling
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # HealthSync Server
//!
//! Receives wearable telemetry webhooks from the ROOK aggregation service
//! and reconciles them into one canonical health document per user.
//!
//! ## Pipeline
//!
//! 1. **Ingress** verifies the HMAC signature, routes the payload to a user
//!    and device, persists the raw body, and enqueues a message.
//! 2. **Queue** delivers messages at least once with a visibility timeout
//!    and dead-letters messages that exhaust their receive budget.
//! 3. **Worker** transforms the payload into the canonical schema, merges it
//!    with stored state under recency rules, and persists the result.
//! 4. **Replay** rebuilds queue messages from raw rows that never reached a
//!    terminal state.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use healthsync_server::config::environment::ServerConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("HealthSync configured with port: HTTP={}", config.http.port);
//!     Ok(())
//! }
//! ```

// ── Public API ──────────────────────────────────────────────────────────
// These modules are used by binary crates (src/bin/) and integration tests (tests/).

/// Configuration management and environment parsing
pub mod config;

/// `SQLite` persistence for raw webhooks, canonical documents, and users
pub mod database;

/// Webhook ingress service
pub mod ingress;

/// Process lifecycle and shutdown signals
pub mod lifecycle;

/// Structured logging setup and domain log helpers
pub mod logging;

/// Durable and in-memory message queues
pub mod queue;

/// Raw webhook replay
pub mod replay;

/// `HTTP` routes
pub mod routes;

/// Storage traits and in-memory implementations
pub mod storage;

/// Queue consumers that reconcile messages into canonical state
pub mod worker;

// Re-export core modules so crate code can use `crate::errors::*`
pub use healthsync_core::constants;
pub use healthsync_core::errors;
pub use healthsync_core::models;
