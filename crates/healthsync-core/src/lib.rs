// ABOUTME: Core types and constants for the HealthSync ingestion pipeline
// ABOUTME: Foundation crate with error handling, canonical health models, and constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # HealthSync Core
//!
//! Foundation crate shared by the provider integrations, the merge engine,
//! and the server. It changes rarely, which keeps incremental builds of the
//! rest of the workspace cheap.
//!
//! ## Modules
//!
//! - **errors**: `AppError`, `ErrorCode` and the transient/permanent split
//! - **constants**: data structure tags, header names, queue defaults
//! - **models**: canonical records, device connections, webhook envelopes

/// Unified error handling system with standard error codes
pub mod errors;

/// Application constants organized by domain
pub mod constants;

/// Core data models
pub mod models;
