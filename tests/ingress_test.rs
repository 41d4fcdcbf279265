// ABOUTME: Integration tests for webhook ingress: signature checks, routing drops, persistence, enqueue
// ABOUTME: Runs the ingress service against in-memory stores and queues
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{
    notification_payload, sign, sleep_payload, TestPipeline, UnavailableQueue, TEST_SECRET,
};
use healthsync_providers::{SignatureValidation, SignatureVerifier, WebhookKind};
use healthsync_server::{
    config::SignaturePolicy,
    ingress::{IngressOutcome, IngressService},
    models::QueueMessage,
    queue::MessageQueue,
    storage::{InMemoryRawWebhookStore, InMemoryUserDirectory, RawWebhookStore},
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_signed_sleep_webhook_is_persisted_and_enqueued() {
    let pipeline = TestPipeline::new();
    let body = serde_json::to_vec(&sleep_payload(
        &pipeline.user_id.to_string(),
        "2024-01-01T08:00:00Z",
        28_800,
    ))
    .unwrap();

    let outcome = pipeline
        .ingress
        .receive(WebhookKind::HealthData, &body, Some(&sign(&body)))
        .await;

    let IngressOutcome::Accepted {
        raw_webhook_id,
        queue_message_id,
    } = outcome.clone()
    else {
        panic!("expected Accepted, got {outcome:?}");
    };
    assert_eq!(outcome.status_code(), 200);

    let row = pipeline.raw_webhooks.get(raw_webhook_id).await.unwrap().unwrap();
    assert!(!row.processed);
    assert_eq!(row.provider, "rook");
    assert_eq!(row.data_structure, "sleep_summary");
    assert_eq!(row.queue_message_id, queue_message_id);

    let depth = pipeline.queue.depth().await.unwrap();
    assert_eq!(depth.visible, 1);

    let messages = pipeline.queue.receive(10, Duration::ZERO).await.unwrap();
    assert_eq!(messages.len(), 1);
    let envelope = QueueMessage::from_body(&messages[0].body).unwrap();
    assert_eq!(envelope.raw_webhook_id, raw_webhook_id);
    assert_eq!(envelope.user_id, pipeline.user_id.to_string());
    assert_eq!(envelope.device_source, "oura");
    assert_eq!(envelope.received_at, row.received_at);
}

#[tokio::test]
async fn test_unroutable_user_is_dropped_without_side_effects() {
    let pipeline = TestPipeline::new();
    let body =
        serde_json::to_vec(&sleep_payload("not-a-user", "2024-01-01T08:00:00Z", 28_800)).unwrap();

    let outcome = pipeline
        .ingress
        .receive(WebhookKind::HealthData, &body, Some(&sign(&body)))
        .await;

    assert!(matches!(outcome, IngressOutcome::Dropped { .. }));
    assert_eq!(outcome.status_code(), 200);
    assert!(pipeline.raw_webhooks.is_empty());
    assert_eq!(pipeline.queue.depth().await.unwrap().visible, 0);
}

#[tokio::test]
async fn test_unknown_user_is_dropped() {
    let pipeline = TestPipeline::new();
    let stranger = Uuid::new_v4().to_string();
    let body = serde_json::to_vec(&sleep_payload(&stranger, "2024-01-01T08:00:00Z", 28_800)).unwrap();

    let outcome = pipeline
        .ingress
        .receive(WebhookKind::HealthData, &body, Some(&sign(&body)))
        .await;

    match outcome {
        IngressOutcome::Dropped { reason } => assert_eq!(reason, "unknown user"),
        other => panic!("expected Dropped, got {other:?}"),
    }
    assert!(pipeline.raw_webhooks.is_empty());
}

#[tokio::test]
async fn test_bad_signature_is_rejected_before_anything_is_stored() {
    let pipeline = TestPipeline::new();
    let body = serde_json::to_vec(&sleep_payload(
        &pipeline.user_id.to_string(),
        "2024-01-01T08:00:00Z",
        28_800,
    ))
    .unwrap();
    let tampered = sign(b"something else");

    let outcome = pipeline
        .ingress
        .receive(WebhookKind::HealthData, &body, Some(&tampered))
        .await;
    assert_eq!(
        outcome,
        IngressOutcome::Unauthorized {
            validation: SignatureValidation::Invalid
        }
    );
    assert_eq!(outcome.status_code(), 401);

    let missing = pipeline
        .ingress
        .receive(WebhookKind::HealthData, &body, None)
        .await;
    assert_eq!(
        missing,
        IngressOutcome::Unauthorized {
            validation: SignatureValidation::Missing
        }
    );
    assert!(pipeline.raw_webhooks.is_empty());
}

#[tokio::test]
async fn test_bypass_policy_accepts_unsigned_webhooks() {
    let pipeline = TestPipeline::with_policy(SignaturePolicy::Bypass);
    let body = serde_json::to_vec(&sleep_payload(
        &pipeline.user_id.to_string(),
        "2024-01-01T08:00:00Z",
        28_800,
    ))
    .unwrap();

    let outcome = pipeline
        .ingress
        .receive(WebhookKind::HealthData, &body, None)
        .await;
    assert!(matches!(outcome, IngressOutcome::Accepted { .. }));
    assert_eq!(pipeline.raw_webhooks.len(), 1);
}

#[tokio::test]
async fn test_malformed_json_is_dropped() {
    let pipeline = TestPipeline::new();
    let body = b"{\"user_id\": ".to_vec();

    let outcome = pipeline
        .ingress
        .receive(WebhookKind::HealthData, &body, Some(&sign(&body)))
        .await;
    assert!(matches!(outcome, IngressOutcome::Dropped { .. }));
    assert!(pipeline.raw_webhooks.is_empty());
}

#[tokio::test]
async fn test_payload_without_device_source_is_dropped() {
    let pipeline = TestPipeline::new();
    let body = serde_json::to_vec(&serde_json::json!({
        "user_id": pipeline.user_id.to_string(),
        "data_structure": "sleep_summary",
        "sleep_health": {"summary": {"sleep_summary": {"duration": {}}}}
    }))
    .unwrap();

    let outcome = pipeline
        .ingress
        .receive(WebhookKind::HealthData, &body, Some(&sign(&body)))
        .await;
    assert!(matches!(outcome, IngressOutcome::Dropped { .. }));
}

#[tokio::test]
async fn test_notification_is_routed_as_connection_update() {
    let pipeline = TestPipeline::new();
    let body = serde_json::to_vec(&notification_payload(
        &pipeline.user_id.to_string(),
        "Oura",
        true,
        "2024-01-01T08:00:00Z",
    ))
    .unwrap();

    let outcome = pipeline
        .ingress
        .receive(WebhookKind::Notification, &body, Some(&sign(&body)))
        .await;
    let IngressOutcome::Accepted { raw_webhook_id, .. } = outcome else {
        panic!("expected Accepted, got {outcome:?}");
    };

    let row = pipeline.raw_webhooks.get(raw_webhook_id).await.unwrap().unwrap();
    assert_eq!(row.data_structure, "connection_update");
}

#[tokio::test]
async fn test_failed_enqueue_still_acknowledges_and_keeps_raw_row() {
    common::init_test_logging();
    let user_id = Uuid::new_v4();
    let raw_webhooks = Arc::new(InMemoryRawWebhookStore::new());
    let ingress = IngressService::new(
        raw_webhooks.clone(),
        Arc::new(UnavailableQueue),
        Arc::new(InMemoryUserDirectory::with_users([user_id])),
        SignatureVerifier::new(Some(TEST_SECRET)),
        SignaturePolicy::Enforce,
    );
    let body = serde_json::to_vec(&sleep_payload(
        &user_id.to_string(),
        "2024-01-01T08:00:00Z",
        28_800,
    ))
    .unwrap();

    let outcome = ingress
        .receive(WebhookKind::HealthData, &body, Some(&sign(&body)))
        .await;

    let IngressOutcome::Accepted {
        raw_webhook_id,
        queue_message_id,
    } = outcome
    else {
        panic!("expected Accepted, got {outcome:?}");
    };
    assert_eq!(queue_message_id, None);

    let unprocessed = raw_webhooks.find_unprocessed(10, None).await.unwrap();
    assert_eq!(unprocessed.len(), 1);
    assert_eq!(unprocessed[0].id, raw_webhook_id);
    assert_eq!(unprocessed[0].queue_message_id, None);
}
