// ABOUTME: ServerConfig loaded from environment variables for HTTP, database, queue, and workers
// ABOUTME: Validation refuses unsigned webhooks in production and unsafe queue timeouts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Environment-based configuration shared by every binary

use crate::constants::{limits, ports, queue};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment type for security and other configurations
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development
    #[default]
    Development,
    /// Production deployment
    Production,
    /// Automated tests
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Type-safe database location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseUrl {
    /// `SQLite` database with file path
    SQLite {
        /// Database file
        path: PathBuf,
    },
    /// In-memory `SQLite` (for testing)
    Memory,
}

impl DatabaseUrl {
    /// Parse from string; bare paths are treated as `SQLite` files
    #[must_use]
    pub fn parse_url(s: &str) -> Self {
        let path = s.strip_prefix("sqlite:").unwrap_or(s);
        let path = path.strip_prefix("//").unwrap_or(path);
        if path == ":memory:" {
            Self::Memory
        } else {
            Self::SQLite {
                path: PathBuf::from(path),
            }
        }
    }

    /// Convert to connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::Memory => "sqlite::memory:".to_owned(),
        }
    }

    /// Check if this is an in-memory database
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_connection_string())
    }
}

/// How ingress treats webhook signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignaturePolicy {
    /// Verify every request; fail closed
    Enforce,
    /// Accept unsigned requests (never allowed in production)
    Bypass,
}

/// Queue backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// `SQLite` table shared by ingress and worker processes
    Sqlite,
    /// Process-local queue (tests, single-process development)
    Memory,
}

impl QueueBackend {
    /// Parse from string with fallback to `Sqlite`
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "memory" | "in-memory" => Self::Memory,
            _ => Self::Sqlite,
        }
    }
}

/// HTTP ingress settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Maximum accepted body size in bytes
    pub max_body_bytes: usize,
}

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database location
    pub url: DatabaseUrl,
    /// Connection pool size
    pub max_connections: u32,
}

/// Webhook verification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// ROOK HMAC secret
    pub rook_secret: Option<String>,
    /// Signature handling
    pub signature_policy: SignaturePolicy,
}

/// Durable queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Backend
    pub backend: QueueBackend,
    /// Seconds a received message stays invisible to other consumers
    pub visibility_timeout_secs: u64,
    /// Deliveries before dead-lettering
    pub max_receive_count: u32,
}

impl QueueConfig {
    /// Visibility timeout as a `Duration`
    #[must_use]
    pub const fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Sqlite,
            visibility_timeout_secs: queue::DEFAULT_VISIBILITY_TIMEOUT_SECS,
            max_receive_count: queue::DEFAULT_MAX_RECEIVE_COUNT,
        }
    }
}

/// Consumer worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Consumer tasks per process
    pub worker_count: usize,
    /// Messages claimed per poll
    pub batch_size: u32,
    /// Long-poll wait in seconds
    pub receive_wait_secs: u64,
    /// Sleep after an empty poll, in milliseconds
    pub idle_backoff_ms: u64,
    /// In-process attempts per storage call
    pub retry_attempts: u32,
    /// Delay between in-process attempts, in milliseconds
    pub retry_delay_ms: u64,
    /// Deadline for one message, in seconds
    pub message_timeout_secs: u64,
    /// Grace period for the in-flight message on shutdown, in seconds
    pub shutdown_grace_secs: u64,
}

impl WorkerConfig {
    /// Long-poll wait
    #[must_use]
    pub const fn receive_wait(&self) -> Duration {
        Duration::from_secs(self.receive_wait_secs)
    }

    /// Sleep after an empty poll
    #[must_use]
    pub const fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    /// Deadline for one message
    #[must_use]
    pub const fn message_timeout(&self) -> Duration {
        Duration::from_secs(self.message_timeout_secs)
    }

    /// Grace period on shutdown
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: queue::DEFAULT_WORKER_COUNT,
            batch_size: queue::DEFAULT_BATCH_SIZE,
            receive_wait_secs: queue::DEFAULT_RECEIVE_WAIT_SECS,
            idle_backoff_ms: queue::DEFAULT_IDLE_BACKOFF_MS,
            retry_attempts: queue::DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: queue::DEFAULT_RETRY_DELAY_MS,
            message_timeout_secs: queue::DEFAULT_MESSAGE_TIMEOUT_SECS,
            shutdown_grace_secs: queue::DEFAULT_SHUTDOWN_GRACE_SECS,
        }
    }
}

/// Complete service configuration, shared by all binaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Deployment environment
    pub environment: Environment,
    /// HTTP ingress
    pub http: HttpConfig,
    /// Database
    pub database: DatabaseConfig,
    /// Webhook verification
    pub webhook: WebhookConfig,
    /// Durable queue
    pub queue: QueueConfig,
    /// Consumer worker
    pub worker: WorkerConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a variable fails to parse or the resulting
    /// configuration is unsafe (see [`ServerConfig::validate`])
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");
        load_dotenv();

        let environment = Environment::from_str_or_default(&env_var_or("ENVIRONMENT", "development"));

        let allow_unsigned: bool = parse_env("HEALTHSYNC_WEBHOOK_ALLOW_UNSIGNED", false)?;
        let rook_secret = env::var("ROOK_WEBHOOK_SECRET")
            .ok()
            .filter(|secret| !secret.trim().is_empty());

        let config = Self {
            environment,
            http: HttpConfig {
                host: env_var_or("HTTP_HOST", "0.0.0.0"),
                port: parse_env("HTTP_PORT", ports::DEFAULT_HTTP_PORT)?,
                request_timeout_secs: parse_env("HTTP_REQUEST_TIMEOUT_SECS", 30)?,
                max_body_bytes: parse_env("HTTP_MAX_BODY_BYTES", limits::MAX_WEBHOOK_BODY_BYTES)?,
            },
            database: DatabaseConfig {
                url: DatabaseUrl::parse_url(&env_var_or("DATABASE_URL", "sqlite:./data/healthsync.db")),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5)?,
            },
            webhook: WebhookConfig {
                rook_secret,
                signature_policy: if allow_unsigned {
                    SignaturePolicy::Bypass
                } else {
                    SignaturePolicy::Enforce
                },
            },
            queue: QueueConfig {
                backend: QueueBackend::from_str_or_default(&env_var_or("QUEUE_BACKEND", "sqlite")),
                visibility_timeout_secs: parse_env(
                    "QUEUE_VISIBILITY_TIMEOUT_SECS",
                    queue::DEFAULT_VISIBILITY_TIMEOUT_SECS,
                )?,
                max_receive_count: parse_env(
                    "QUEUE_MAX_RECEIVE_COUNT",
                    queue::DEFAULT_MAX_RECEIVE_COUNT,
                )?,
            },
            worker: WorkerConfig {
                worker_count: parse_env("WORKER_COUNT", queue::DEFAULT_WORKER_COUNT)?,
                batch_size: parse_env("WORKER_BATCH_SIZE", queue::DEFAULT_BATCH_SIZE)?,
                receive_wait_secs: parse_env(
                    "WORKER_RECEIVE_WAIT_SECS",
                    queue::DEFAULT_RECEIVE_WAIT_SECS,
                )?
                .min(queue::MAX_RECEIVE_WAIT_SECS),
                idle_backoff_ms: parse_env("WORKER_IDLE_BACKOFF_MS", queue::DEFAULT_IDLE_BACKOFF_MS)?,
                retry_attempts: parse_env("WORKER_RETRY_ATTEMPTS", queue::DEFAULT_RETRY_ATTEMPTS)?,
                retry_delay_ms: parse_env("WORKER_RETRY_DELAY_MS", queue::DEFAULT_RETRY_DELAY_MS)?,
                message_timeout_secs: parse_env(
                    "WORKER_MESSAGE_TIMEOUT_SECS",
                    queue::DEFAULT_MESSAGE_TIMEOUT_SECS,
                )?,
                shutdown_grace_secs: parse_env(
                    "WORKER_SHUTDOWN_GRACE_SECS",
                    queue::DEFAULT_SHUTDOWN_GRACE_SECS,
                )?,
            },
        };

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error when:
    /// - unsigned webhooks are allowed in production
    /// - the visibility timeout does not exceed the per-message deadline
    /// - a count that must be positive is zero
    pub fn validate(&self) -> Result<()> {
        if self.webhook.signature_policy == SignaturePolicy::Bypass {
            if self.environment.is_production() {
                return Err(anyhow!(
                    "HEALTHSYNC_WEBHOOK_ALLOW_UNSIGNED cannot be enabled in production"
                ));
            }
            warn!(
                environment = %self.environment,
                "Webhook signature verification is DISABLED; unsigned payloads will be accepted"
            );
        } else if self.webhook.rook_secret.is_none() {
            warn!("ROOK_WEBHOOK_SECRET is not set; every webhook will be rejected with 401");
        }

        if self.queue.visibility_timeout_secs <= self.worker.message_timeout_secs {
            return Err(anyhow!(
                "QUEUE_VISIBILITY_TIMEOUT_SECS ({}) must exceed WORKER_MESSAGE_TIMEOUT_SECS ({})",
                self.queue.visibility_timeout_secs,
                self.worker.message_timeout_secs
            ));
        }

        if self.queue.max_receive_count == 0 {
            return Err(anyhow!("QUEUE_MAX_RECEIVE_COUNT must be at least 1"));
        }
        if self.worker.worker_count == 0 || self.worker.batch_size == 0 {
            return Err(anyhow!("WORKER_COUNT and WORKER_BATCH_SIZE must be at least 1"));
        }
        if self.worker.retry_attempts == 0 {
            return Err(anyhow!("WORKER_RETRY_ATTEMPTS must be at least 1"));
        }

        Ok(())
    }

    /// Get a summary of the configuration for logging (without secrets)
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "HealthSync Configuration:\n\
             - Environment: {}\n\
             - HTTP: {}:{}\n\
             - Database: {}\n\
             - ROOK Secret: {}\n\
             - Signature Policy: {:?}\n\
             - Queue: {:?} (visibility {}s, max receives {})\n\
             - Workers: {} x batch {} (retry {} x {}ms, message timeout {}s)",
            self.environment,
            self.http.host,
            self.http.port,
            if self.database.url.is_memory() {
                "SQLite (in-memory)"
            } else {
                "SQLite"
            },
            if self.webhook.rook_secret.is_some() {
                "Configured"
            } else {
                "Missing"
            },
            self.webhook.signature_policy,
            self.queue.backend,
            self.queue.visibility_timeout_secs,
            self.queue.max_receive_count,
            self.worker.worker_count,
            self.worker.batch_size,
            self.worker.retry_attempts,
            self.worker.retry_delay_ms,
            self.worker.message_timeout_secs,
        )
    }
}

/// Get environment variable or default value
/// Load a `.env` file from the working directory or one of its parents
///
/// Variables already present in the process environment are left alone.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => info!(path = %path.display(), "Loaded .env file"),
        Err(e) => debug!(error = %e, "No .env file loaded"),
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Parse an environment variable, falling back to `default` when unset
fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key} value: {value:?}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig {
            environment: Environment::Development,
            http: HttpConfig {
                host: "127.0.0.1".to_owned(),
                port: ports::DEFAULT_HTTP_PORT,
                request_timeout_secs: 30,
                max_body_bytes: limits::MAX_WEBHOOK_BODY_BYTES,
            },
            database: DatabaseConfig {
                url: DatabaseUrl::Memory,
                max_connections: 1,
            },
            webhook: WebhookConfig {
                rook_secret: Some("secret".to_owned()),
                signature_policy: SignaturePolicy::Enforce,
            },
            queue: QueueConfig::default(),
            worker: WorkerConfig::default(),
        }
    }

    #[test]
    fn test_database_url_parsing() {
        assert_eq!(DatabaseUrl::parse_url("sqlite::memory:"), DatabaseUrl::Memory);
        assert_eq!(
            DatabaseUrl::parse_url("sqlite:./test.db").to_connection_string(),
            "sqlite:./test.db"
        );
        assert_eq!(
            DatabaseUrl::parse_url("./some/path.db"),
            DatabaseUrl::SQLite {
                path: PathBuf::from("./some/path.db")
            }
        );
    }

    #[test]
    fn test_bypass_rejected_in_production() {
        let mut config = config();
        config.webhook.signature_policy = SignaturePolicy::Bypass;
        assert!(config.validate().is_ok());

        config.environment = Environment::Production;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_visibility_must_exceed_message_timeout() {
        let mut config = config();
        config.queue.visibility_timeout_secs = config.worker.message_timeout_secs;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_redacts_secret() {
        let summary = config().summary();
        assert!(summary.contains("ROOK Secret: Configured"));
        assert!(!summary.contains("secret\n"));
    }
}
