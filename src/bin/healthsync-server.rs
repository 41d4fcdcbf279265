// ABOUTME: HTTP ingress server receiving ROOK webhooks and enqueueing them for reconciliation
// ABOUTME: Runs an embedded worker pool when the queue backend lives in process memory
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # HealthSync Server Binary
//!
//! Serves `POST /webhooks/{provider}/health-data`,
//! `POST /webhooks/{provider}/notifications`, `/health` and `/ready`.

use anyhow::{Context, Result};
use clap::Parser;
use healthsync_providers::SignatureVerifier;
use healthsync_server::{
    config::{environment::ServerConfig, QueueBackend},
    constants::service_names,
    database::Database,
    ingress::IngressService,
    lifecycle, logging, queue,
    routes::{self, ServerResources},
    worker::{WorkerContext, WorkerPool, WorkerSettings},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "healthsync-server")]
#[command(about = "HealthSync - wearable webhook ingestion server")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http.port = http_port;
    }

    logging::init_from_env(service_names::HEALTHSYNC_SERVER)?;

    info!("Starting HealthSync ingestion server");
    info!("{}", config.summary());

    let database = Database::new(
        &config.database.url.to_connection_string(),
        config.database.max_connections,
    )
    .await?;
    let database = Arc::new(database);
    let queue = queue::from_config(&config.queue, &database).await?;

    let ingress = IngressService::new(
        database.clone(),
        Arc::clone(&queue),
        database.clone(),
        SignatureVerifier::new(config.webhook.rook_secret.as_deref()),
        config.webhook.signature_policy,
    );

    let shutdown = CancellationToken::new();
    lifecycle::cancel_on_shutdown_signal(shutdown.clone());

    // An in-memory queue is invisible to a separate worker process
    let embedded_workers = (config.queue.backend == QueueBackend::Memory).then(|| {
        info!("In-memory queue selected, starting embedded workers");
        WorkerPool::spawn(
            config.worker.worker_count,
            &WorkerContext {
                queue: Arc::clone(&queue),
                raw_webhooks: database.clone(),
                canonical: database.clone(),
            },
            WorkerSettings::from_config(&config.worker, &config.queue),
            shutdown.child_token(),
        )
    });

    let resources = Arc::new(ServerResources {
        ingress: Arc::new(ingress),
        queue,
        store_health: database,
    });
    let app = routes::router(resources, &config.http);

    let address = format!("{}:{}", config.http.host, config.http.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    info!("=== Available API Endpoints ===");
    info!("   Health Data:   POST http://{address}/webhooks/rook/health-data");
    info!("   Notifications: POST http://{address}/webhooks/rook/notifications");
    info!("   Health:        GET  http://{address}/health");
    info!("   Readiness:     GET  http://{address}/ready");

    let server_shutdown = shutdown.clone();
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
    {
        error!("Server error: {}", e);
        shutdown.cancel();
        return Err(e.into());
    }

    if let Some(pool) = embedded_workers {
        pool.cancel();
        pool.join().await;
    }

    info!("HealthSync server stopped");
    Ok(())
}
