// ABOUTME: HealthSync admin CLI for replaying raw webhooks and managing the dead-letter channel
// ABOUTME: Also registers users and reports queue depth against the configured database
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
//!
//! Usage:
//! ```bash
//! # Re-enqueue raw webhooks that never reached a terminal state
//! healthsync-admin replay --limit 500 --older-than-minutes 10
//!
//! # List raw webhooks whose processing recorded an error, and re-enqueue them
//! healthsync-admin failed --replay
//!
//! # Inspect and redrive dead-lettered messages
//! healthsync-admin dead-letters list
//! healthsync-admin dead-letters redrive 1b4e28ba-2fa1-11d2-883f-0016d3cca427
//!
//! # Register a user so their webhooks are accepted
//! healthsync-admin user register 5f0c6a2e-8d1b-4c3e-9a57-2b6f1d0e4c88
//! ```

mod commands;
mod helpers;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use healthsync_server::{
    config::{environment::ServerConfig, QueueBackend},
    constants::{limits, service_names},
    database::Database,
    logging::LoggingConfig,
    queue,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "healthsync-admin",
    about = "HealthSync administration CLI",
    long_about = "Replay raw webhooks, inspect failures, and manage the dead-letter channel."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Database URL override
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Re-enqueue raw webhooks that are still unprocessed
    Replay {
        /// Maximum rows to replay
        #[arg(long, default_value_t = limits::DEFAULT_REPLAY_LIMIT)]
        limit: u32,

        /// Only rows received more than this many minutes ago
        #[arg(long)]
        older_than_minutes: Option<i64>,
    },

    /// List raw webhooks whose processing recorded an error
    Failed {
        /// Maximum rows to show
        #[arg(long, default_value_t = limits::DEFAULT_REPLAY_LIMIT)]
        limit: u32,

        /// Re-enqueue the listed rows
        #[arg(long)]
        replay: bool,
    },

    /// Dead-letter channel management
    DeadLetters {
        #[command(subcommand)]
        action: DeadLetterCommand,
    },

    /// User directory management
    User {
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Show queue depth
    Depth,
}

#[derive(Subcommand)]
enum DeadLetterCommand {
    /// List dead-lettered messages, oldest first
    List {
        /// Maximum messages to show
        #[arg(long, default_value_t = limits::DEFAULT_REPLAY_LIMIT)]
        limit: u32,
    },

    /// Move a dead-lettered message back to the queue
    Redrive {
        /// Message id
        message_id: String,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Register a user id
    Register {
        /// Local user id
        user_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Before the logging config, so LOG_* values from .env apply
    healthsync_server::config::load_dotenv();
    let mut logging = LoggingConfig::from_env(service_names::HEALTHSYNC_ADMIN);
    if cli.verbose {
        logging.level = "debug".into();
    }
    logging.init()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database.url = healthsync_server::config::DatabaseUrl::parse_url(&url);
    }

    if config.queue.backend == QueueBackend::Memory && !matches!(cli.command, Command::User { .. })
    {
        bail!("QUEUE_BACKEND=memory is private to the server process and cannot be managed here");
    }

    let database_url = config.database.url.to_connection_string();
    info!("Connecting to database: {}", database_url);
    let database = Arc::new(Database::new(&database_url, config.database.max_connections).await?);
    let queue = queue::from_config(&config.queue, &database).await?;

    match cli.command {
        Command::Replay {
            limit,
            older_than_minutes,
        } => {
            commands::replay::unprocessed(&database, queue, limit, older_than_minutes).await?;
        }
        Command::Failed { limit, replay } => {
            commands::replay::failed(&database, queue, limit, replay).await?;
        }
        Command::DeadLetters { action } => match action {
            DeadLetterCommand::List { limit } => {
                commands::dead_letters::list(queue.as_ref(), limit).await?;
            }
            DeadLetterCommand::Redrive { message_id } => {
                commands::dead_letters::redrive(queue.as_ref(), &message_id).await?;
            }
        },
        Command::User { action } => match action {
            UserCommand::Register { user_id } => {
                commands::user::register(database.as_ref(), user_id).await?;
            }
        },
        Command::Depth => {
            commands::dead_letters::depth(queue.as_ref()).await?;
        }
    }

    Ok(())
}
