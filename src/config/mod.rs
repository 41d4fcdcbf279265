// ABOUTME: Configuration management module for centralized service settings
// ABOUTME: Environment-only configuration shared by the server, worker, and admin binaries
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Configuration module
//!
//! All settings come from environment variables, optionally seeded from a
//! `.env` file, see [`environment::ServerConfig::from_env`].

/// Environment and server configuration
pub mod environment;

pub use environment::{
    load_dotenv, DatabaseConfig, DatabaseUrl, Environment, HttpConfig, QueueBackend, QueueConfig,
    ServerConfig, SignaturePolicy, WebhookConfig, WorkerConfig,
};
