// ABOUTME: Webhook ingress: verify, route, persist the raw payload, then enqueue for the worker
// ABOUTME: Raw persistence happens before enqueue so every accepted webhook can be replayed
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Webhook Ingress
//!
//! [`IngressService::receive`] runs the synchronous half of the pipeline and
//! reports an [`IngressOutcome`] that the HTTP layer maps to a status code:
//!
//! | Outcome        | Status | Persisted |
//! |----------------|--------|-----------|
//! | `Unauthorized` | 401    | nothing   |
//! | `Dropped`      | 200    | nothing   |
//! | `Failed`       | 500    | nothing   |
//! | `Accepted`     | 200    | raw row, plus a queue message when enqueue succeeded |
//!
//! Unroutable payloads are acknowledged so the provider does not retry
//! something that can never be routed. A failed enqueue is acknowledged as
//! well: the raw row stays unprocessed and replay picks it up.

use crate::config::SignaturePolicy;
use crate::constants::providers;
use crate::errors::AppResult;
use crate::logging::AppLogger;
use crate::models::{NewRawWebhook, QueueMessage};
use crate::queue::MessageQueue;
use crate::storage::{RawWebhookStore, UserDirectory};
use chrono::{DateTime, Utc};
use healthsync_providers::rook::{resolve_user_id, route, RoutedWebhook};
use healthsync_providers::{SignatureValidation, SignatureVerifier, WebhookKind};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

/// Result of one ingress request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressOutcome {
    /// Raw row written
    Accepted {
        /// Raw webhook id
        raw_webhook_id: Uuid,
        /// Queue message id, `None` when enqueue failed
        queue_message_id: Option<String>,
    },
    /// Acknowledged without storing anything
    Dropped {
        /// Why
        reason: String,
    },
    /// Signature check failed
    Unauthorized {
        /// Validation result
        validation: SignatureValidation,
    },
    /// Raw row could not be written; the provider should retry
    Failed {
        /// Storage error
        error: String,
    },
}

impl IngressOutcome {
    /// HTTP status for this outcome
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Accepted { .. } | Self::Dropped { .. } => 200,
            Self::Unauthorized { .. } => 401,
            Self::Failed { .. } => 500,
        }
    }
}

/// Synchronous webhook handling shared by every route
pub struct IngressService {
    raw_webhooks: Arc<dyn RawWebhookStore>,
    queue: Arc<dyn MessageQueue>,
    users: Arc<dyn UserDirectory>,
    verifier: SignatureVerifier,
    signature_policy: SignaturePolicy,
}

impl IngressService {
    /// Create the service
    #[must_use]
    pub fn new(
        raw_webhooks: Arc<dyn RawWebhookStore>,
        queue: Arc<dyn MessageQueue>,
        users: Arc<dyn UserDirectory>,
        verifier: SignatureVerifier,
        signature_policy: SignaturePolicy,
    ) -> Self {
        Self {
            raw_webhooks,
            queue,
            users,
            verifier,
            signature_policy,
        }
    }

    /// Handle one ROOK webhook
    pub async fn receive(
        &self,
        kind: WebhookKind,
        body: &[u8],
        signature: Option<&str>,
    ) -> IngressOutcome {
        let validation = self.verifier.validate(signature, body);
        if !validation.is_valid() {
            if self.signature_policy == SignaturePolicy::Bypass {
                AppLogger::log_security_event(
                    "webhook_signature_bypassed",
                    "medium",
                    &format!("Accepted {kind} webhook without a valid signature ({validation:?})"),
                );
            } else {
                AppLogger::log_security_event(
                    "webhook_signature_rejected",
                    "high",
                    &format!("Rejected {kind} webhook ({validation:?})"),
                );
                return IngressOutcome::Unauthorized { validation };
            }
        }

        let payload: Value = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => return Self::drop_webhook(format!("malformed JSON body: {e}"), None),
        };

        let routed = match route(kind, &payload) {
            Ok(routed) => routed,
            Err(e) => return Self::drop_webhook(e.message, None),
        };

        let Some(user_id) = resolve_user_id(&routed.external_user_id) else {
            return Self::drop_webhook(
                "user reference is not a valid id".to_owned(),
                Some(&routed.external_user_id),
            );
        };
        match self.users.user_exists(user_id).await {
            Ok(true) => {}
            Ok(false) => {
                return Self::drop_webhook(
                    "unknown user".to_owned(),
                    Some(&routed.external_user_id),
                )
            }
            Err(e) => {
                error!(error = %e, "User lookup failed");
                return IngressOutcome::Failed {
                    error: e.to_string(),
                };
            }
        }

        let received_at = Utc::now();
        let raw_webhook_id = match self
            .raw_webhooks
            .record(NewRawWebhook {
                provider: providers::ROOK.to_owned(),
                external_user_id: routed.external_user_id.clone(),
                data_structure: routed.data_structure.clone(),
                payload: payload.clone(),
                received_at,
            })
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "Failed to persist raw webhook");
                return IngressOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        let queue_message_id = self
            .enqueue(raw_webhook_id, user_id, &routed, payload, received_at)
            .await;

        AppLogger::log_webhook_received(
            providers::ROOK,
            &routed.data_structure,
            &raw_webhook_id.to_string(),
            queue_message_id.is_some(),
        );

        IngressOutcome::Accepted {
            raw_webhook_id,
            queue_message_id,
        }
    }

    /// Enqueue and link; failures leave the raw row for replay
    async fn enqueue(
        &self,
        raw_webhook_id: Uuid,
        user_id: Uuid,
        routed: &RoutedWebhook,
        payload: Value,
        received_at: DateTime<Utc>,
    ) -> Option<String> {
        let message = QueueMessage {
            raw_webhook_id,
            user_id: user_id.to_string(),
            device_source: routed.device_source.to_string(),
            data_structure: routed.data_structure.clone(),
            payload,
            received_at,
        };

        match enqueue_and_link(self.queue.as_ref(), self.raw_webhooks.as_ref(), &message).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(
                    raw_webhook_id = %raw_webhook_id,
                    error = %e,
                    "Enqueue failed, raw webhook left for replay"
                );
                None
            }
        }
    }

    fn drop_webhook(reason: String, external_user_id: Option<&str>) -> IngressOutcome {
        AppLogger::log_webhook_dropped(providers::ROOK, &reason, external_user_id);
        IngressOutcome::Dropped { reason }
    }
}

/// Enqueue a message and store its id on the raw row
///
/// A failed link is only logged: the message is already on its way and the
/// worker identifies the row by `raw_webhook_id`.
///
/// # Errors
///
/// Returns an error if the message cannot be encoded or enqueued
pub async fn enqueue_and_link(
    queue: &dyn MessageQueue,
    raw_webhooks: &dyn RawWebhookStore,
    message: &QueueMessage,
) -> AppResult<String> {
    let message_id = queue.enqueue(&message.to_body()?).await?;

    if let Err(e) = raw_webhooks
        .link_queue_message(message.raw_webhook_id, &message_id)
        .await
    {
        warn!(
            raw_webhook_id = %message.raw_webhook_id,
            queue_message_id = %message_id,
            error = %e,
            "Failed to link queue message to raw webhook"
        );
    }
    Ok(message_id)
}
