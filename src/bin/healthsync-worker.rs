// ABOUTME: Queue consumer process that reconciles webhook payloads into canonical user state
// ABOUTME: Runs WORKER_COUNT workers until SIGINT/SIGTERM, then drains in-flight messages
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use anyhow::{bail, Result};
use clap::Parser;
use healthsync_server::{
    config::{environment::ServerConfig, QueueBackend},
    constants::service_names,
    database::Database,
    lifecycle, logging, queue,
    worker::{WorkerContext, WorkerPool, WorkerSettings},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "healthsync-worker")]
#[command(about = "HealthSync - queue consumer and reconciliation worker")]
pub struct Args {
    /// Override WORKER_COUNT
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(workers) = args.workers {
        config.worker.worker_count = workers.max(1);
    }

    logging::init_from_env(service_names::HEALTHSYNC_WORKER)?;

    if config.queue.backend == QueueBackend::Memory {
        bail!("QUEUE_BACKEND=memory is process-local; the server runs its own workers in that mode");
    }

    info!("Starting HealthSync worker");
    info!("{}", config.summary());

    let database = Arc::new(
        Database::new(
            &config.database.url.to_connection_string(),
            config.database.max_connections,
        )
        .await?,
    );
    let queue = queue::from_config(&config.queue, &database).await?;

    let shutdown = CancellationToken::new();
    lifecycle::cancel_on_shutdown_signal(shutdown.clone());

    let pool = WorkerPool::spawn(
        config.worker.worker_count,
        &WorkerContext {
            queue,
            raw_webhooks: database.clone(),
            canonical: database,
        },
        WorkerSettings::from_config(&config.worker, &config.queue),
        shutdown,
    );

    let stats = pool.join().await;
    info!(
        processed = stats.received,
        acked = stats.acked,
        "HealthSync worker stopped"
    );
    Ok(())
}
