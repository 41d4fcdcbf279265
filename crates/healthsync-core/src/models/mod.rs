// ABOUTME: Core data models for the HealthSync ingestion pipeline
// ABOUTME: Re-exports canonical health records, device connections, and webhook envelopes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Data Models
//!
//! - **Canonical records**: provider-agnostic health data per category
//!   (sleep, physical, body, activity events)
//! - **Device connections**: per-user, per-device connection state plus the
//!   merged canonical data for that device
//! - **Webhook envelopes**: the immutable raw audit row and the transient
//!   queue message that references it
//!
//! Canonical types never carry provider-specific units or field names; the
//! provider transformers are the only place where payload shapes are known.

mod canonical;
mod device;
mod webhook;

pub use canonical::{
    ActivityEvent, BodyRecord, CanonicalRecord, HealthCategory, PhysicalRecord, SleepRecord,
    SummaryRecord,
};
pub use device::{
    ConnectionAction, ConnectionUpdate, DeviceConnection, DeviceData, DeviceSource,
    UserHealthDocument,
};
pub use webhook::{DataStructure, NewRawWebhook, QueueMessage, RawWebhook};
