// ABOUTME: Provider webhook routes for health data and notification deliveries
// ABOUTME: Thin handlers that hand the raw body and signature header to the ingress service
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::ServerResources;
use crate::constants::headers::{REQUEST_ID, ROOK_SIGNATURE};
use crate::constants::providers;
use crate::errors::AppError;
use crate::ingress::IngressOutcome;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use healthsync_providers::{SignatureValidation, WebhookKind};
use http::{HeaderMap, StatusCode};
use std::sync::Arc;

/// Webhook routes
pub struct WebhookRoutes;

impl WebhookRoutes {
    /// Create the webhook routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/webhooks/:provider/health-data",
                post(Self::handle_health_data),
            )
            .route(
                "/webhooks/:provider/notifications",
                post(Self::handle_notification),
            )
            .with_state(resources)
    }

    async fn handle_health_data(
        State(resources): State<Arc<ServerResources>>,
        Path(provider): Path<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response, AppError> {
        Self::handle(&resources, &provider, WebhookKind::HealthData, &headers, &body).await
    }

    async fn handle_notification(
        State(resources): State<Arc<ServerResources>>,
        Path(provider): Path<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response, AppError> {
        Self::handle(&resources, &provider, WebhookKind::Notification, &headers, &body).await
    }

    async fn handle(
        resources: &ServerResources,
        provider: &str,
        kind: WebhookKind,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Response, AppError> {
        if provider != providers::ROOK {
            return Err(AppError::not_found(format!("Webhook provider {provider}")));
        }

        let signature = header_str(headers, ROOK_SIGNATURE);

        let outcome = resources.ingress.receive(kind, body, signature).await;
        outcome_response(outcome).map_err(|error| match header_str(headers, REQUEST_ID) {
            Some(request_id) => error.with_request_id(request_id),
            None => error,
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn outcome_response(outcome: IngressOutcome) -> Result<Response, AppError> {
    match outcome {
        IngressOutcome::Accepted {
            raw_webhook_id,
            queue_message_id,
        } => Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "accepted",
                "raw_webhook_id": raw_webhook_id,
                "queued": queue_message_id.is_some(),
            })),
        )
            .into_response()),
        IngressOutcome::Dropped { reason } => Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ignored",
                "reason": reason,
            })),
        )
            .into_response()),
        IngressOutcome::Unauthorized {
            validation: SignatureValidation::Missing,
        } => Err(AppError::auth_required()),
        IngressOutcome::Unauthorized { validation } => Err(AppError::auth_invalid(format!(
            "Webhook signature rejected: {validation:?}"
        ))),
        IngressOutcome::Failed { error } => Err(AppError::internal(format!(
            "Webhook could not be stored: {error}"
        ))),
    }
}
