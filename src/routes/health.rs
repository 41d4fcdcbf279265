// ABOUTME: Health check route handlers for service monitoring and status endpoints
// ABOUTME: Liveness is unconditional; readiness probes the database and the queue
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Health check routes for service monitoring
//!
//! `/health` answers as long as the process serves HTTP. `/ready` answers
//! 503 when the store or the queue cannot be reached, so a load balancer
//! stops sending webhooks that would only fail with 500.

use super::ServerResources;
use crate::errors::AppError;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use std::sync::Arc;

/// Health routes implementation
pub struct HealthRoutes;

impl HealthRoutes {
    /// Create all health check routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/health", get(Self::health_handler))
            .route("/ready", get(Self::ready_handler))
            .with_state(resources)
    }

    async fn health_handler() -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    }

    async fn ready_handler(State(resources): State<Arc<ServerResources>>) -> Response {
        match Self::check_ready(&resources).await {
            Ok(depth) => (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "ready",
                    "queue": depth,
                    "timestamp": chrono::Utc::now().to_rfc3339()
                })),
            )
                .into_response(),
            Err(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "not_ready",
                    "error": e.to_string(),
                    "timestamp": chrono::Utc::now().to_rfc3339()
                })),
            )
                .into_response(),
        }
    }

    async fn check_ready(
        resources: &ServerResources,
    ) -> Result<crate::queue::QueueDepth, AppError> {
        resources.store_health.ping().await?;
        resources.queue.depth().await
    }
}
