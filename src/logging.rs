// ABOUTME: Tracing subscriber setup shared by the server, worker, and admin binaries
// ABOUTME: Also holds AppLogger, the structured events emitted at ingress and per queue delivery
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Structured logging
//!
//! Every binary calls [`init_from_env`] once at startup. Output goes to
//! stdout as pretty text in development and JSON in production, with
//! `RUST_LOG` directives taking precedence over `LOG_LEVEL`.
//!
//! | Variable               | Default              |
//! |------------------------|----------------------|
//! | `RUST_LOG`/`LOG_LEVEL` | `info`               |
//! | `LOG_FORMAT`           | `json` in production, otherwise `pretty` |
//! | `LOG_INCLUDE_LOCATION` | on in production     |
//! | `LOG_SPAN_EVENTS`      | off                  |
//! | `SERVICE_NAME`         | the binary name      |

use anyhow::Result;
use std::env;
use std::io;
use tracing::{info, warn};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Dependencies whose debug output drowns the pipeline's own events
const QUIET_TARGETS: [&str; 5] = [
    "hyper=warn",
    "h2=warn",
    "sqlx=warn",
    "tower=warn",
    "tower_http=info",
];

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Full human readable format
    Pretty,
    /// Single-line human readable
    Compact,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value; unknown values yield `None`
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Subscriber settings for one process
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default level for this crate and unlisted targets
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Add file and line to each event
    pub include_location: bool,
    /// Emit span close events, which carry per-message busy/idle timings
    pub span_events: bool,
    /// Recorded in the startup event
    pub service_name: String,
    /// Recorded in the startup event
    pub environment: String,
}

impl LoggingConfig {
    /// Read settings from the environment
    ///
    /// `default_service` names the binary when `SERVICE_NAME` is unset.
    #[must_use]
    pub fn from_env(default_service: &str) -> Self {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let production = matches!(environment.to_lowercase().as_str(), "production" | "prod");

        let format = env::var("LOG_FORMAT")
            .ok()
            .and_then(|value| LogFormat::parse(&value))
            .unwrap_or(if production {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            });

        Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format,
            include_location: production || env::var("LOG_INCLUDE_LOCATION").is_ok(),
            span_events: env::var("LOG_SPAN_EVENTS").is_ok(),
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| default_service.into()),
            environment,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }

        QUIET_TARGETS
            .iter()
            .filter_map(|directive| directive.parse().ok())
            .fold(EnvFilter::new(&self.level), EnvFilter::add_directive)
    }

    /// Install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed
    pub fn init(&self) -> Result<()> {
        let layer = fmt::layer()
            .with_writer(io::stdout)
            .with_target(true)
            .with_file(self.include_location)
            .with_line_number(self.include_location)
            .with_span_events(if self.span_events {
                FmtSpan::CLOSE
            } else {
                FmtSpan::NONE
            });
        let registry = tracing_subscriber::registry().with(self.env_filter());

        match self.format {
            LogFormat::Json => registry.with(layer.json()).try_init()?,
            LogFormat::Pretty => registry.with(layer).try_init()?,
            LogFormat::Compact => registry.with(layer.compact()).try_init()?,
        }

        info!(
            service.name = %self.service_name,
            service.version = env!("CARGO_PKG_VERSION"),
            environment = %self.environment,
            log.level = %self.level,
            log.format = ?self.format,
            "Logging initialized"
        );
        Ok(())
    }
}

/// Initialize logging from environment for the named service
///
/// # Errors
///
/// Returns an error if logging initialization fails
pub fn init_from_env(default_service: &str) -> Result<()> {
    LoggingConfig::from_env(default_service).init()
}

/// Structured pipeline events with stable field names
pub struct AppLogger;

impl AppLogger {
    /// Log a webhook accepted at ingress
    pub fn log_webhook_received(
        provider: &str,
        data_structure: &str,
        raw_webhook_id: &str,
        enqueued: bool,
    ) {
        info!(
            webhook.provider = %provider,
            webhook.data_structure = %data_structure,
            webhook.raw_id = %raw_webhook_id,
            webhook.enqueued = enqueued,
            "Webhook received"
        );
    }

    /// Log a webhook acknowledged but not stored (unroutable or malformed)
    pub fn log_webhook_dropped(provider: &str, reason: &str, external_user_id: Option<&str>) {
        warn!(
            webhook.provider = %provider,
            webhook.drop_reason = %reason,
            user.external_id = external_user_id.unwrap_or("unknown"),
            "Webhook acknowledged and dropped"
        );
    }

    /// Log a signature rejection or bypass
    pub fn log_security_event(event_type: &str, severity: &str, details: &str) {
        warn!(
            security.event = %event_type,
            security.severity = %severity,
            security.details = %details,
            "Security event"
        );
    }

    /// Log the terminal outcome of one queue delivery
    pub fn log_message_outcome(
        message_id: &str,
        raw_webhook_id: Option<&str>,
        outcome: &str,
        receive_count: u32,
        duration_ms: u64,
    ) {
        info!(
            queue.message_id = %message_id,
            webhook.raw_id = raw_webhook_id.unwrap_or("unknown"),
            queue.outcome = %outcome,
            queue.receive_count = receive_count,
            queue.duration_ms = duration_ms,
            "Queue message handled"
        );
    }
}
