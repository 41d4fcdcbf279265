// ABOUTME: HTTP route assembly for webhook ingress and service health endpoints
// ABOUTME: Wraps every route with request ids, tracing, a request timeout, and a body size limit
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Route module for the ingestion server
//!
//! Each domain module contains only route definitions and thin handlers that
//! delegate to the service layer.

/// Health check and readiness routes
pub mod health;
/// Provider webhook routes
pub mod webhooks;

pub use health::HealthRoutes;
pub use webhooks::WebhookRoutes;

use crate::config::HttpConfig;
use crate::ingress::IngressService;
use crate::queue::MessageQueue;
use crate::storage::StoreHealth;
use axum::extract::DefaultBodyLimit;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared handles used by route handlers
#[derive(Clone)]
pub struct ServerResources {
    /// Webhook ingress
    pub ingress: Arc<IngressService>,
    /// Queue, for depth reporting
    pub queue: Arc<dyn MessageQueue>,
    /// Store connectivity probe
    pub store_health: Arc<dyn StoreHealth>,
}

/// Build the complete router
pub fn router(resources: Arc<ServerResources>, http: &HttpConfig) -> Router {
    Router::new()
        .merge(HealthRoutes::routes(Arc::clone(&resources)))
        .merge(WebhookRoutes::routes(resources))
        .layer(DefaultBodyLimit::max(http.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    http.request_timeout_secs,
                )))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}
