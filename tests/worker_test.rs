// ABOUTME: Integration tests for the consumer worker: merges, redelivery, recency, and dead-lettering
// ABOUTME: Drives ingress and worker end to end over in-memory queues and stores
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{
    activity_event, activity_payload, at, notification_payload, physical_payload, sleep_payload,
    FlakyCanonicalStore, RacingCanonicalStore, TestPipeline,
};
use healthsync_providers::WebhookKind;
use healthsync_server::{
    errors::ErrorCode,
    models::{CanonicalRecord, HealthCategory},
    queue::MessageQueue,
    storage::{CanonicalStateStore, RawWebhookStore},
    worker::{AckDisposition, ProcessingOutcome, WorkerPool, NO_DATA_ERROR},
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Longer than the one-second test visibility timeout
const AFTER_VISIBILITY: Duration = Duration::from_millis(1_100);

fn merged(category: HealthCategory, changed: bool) -> ProcessingOutcome {
    ProcessingOutcome::Acked {
        disposition: AckDisposition::Merged { category, changed },
    }
}

#[tokio::test]
async fn test_first_sleep_webhook_is_merged_and_acknowledged() {
    let pipeline = TestPipeline::new();
    let user = pipeline.user_id.to_string();
    let raw_id = pipeline
        .ingest(&sleep_payload(&user, "2024-01-01T08:00:00Z", 28_800))
        .await;

    let outcomes = pipeline.worker.poll_once().await.unwrap();
    assert_eq!(outcomes, vec![merged(HealthCategory::Sleep, true)]);

    let device = TestPipeline::device("oura");
    let Some(CanonicalRecord::Sleep(sleep)) = pipeline
        .canonical
        .load_category(pipeline.user_id, &device, HealthCategory::Sleep)
        .await
        .unwrap()
    else {
        panic!("sleep record missing");
    };
    assert_eq!(sleep.duration_minutes, Some(480));
    assert_eq!(sleep.last_updated, Some(at("2024-01-01T08:00:00Z")));
    assert_eq!(sleep.hr_resting_bpm, Some(52));

    let connection = pipeline
        .canonical
        .load_device(pipeline.user_id, &device)
        .await
        .unwrap()
        .unwrap();
    assert!(connection.connected);
    assert!(connection.last_sync.is_some());

    let row = pipeline.raw_webhooks.get(raw_id).await.unwrap().unwrap();
    assert!(row.processed);
    assert!(row.processed_at.is_some());
    assert_eq!(row.error, None);

    let depth = pipeline.queue.depth().await.unwrap();
    assert_eq!((depth.visible, depth.in_flight), (0, 0));
}

#[tokio::test]
async fn test_duplicate_delivery_is_a_no_op() {
    let pipeline = TestPipeline::new();
    let user = pipeline.user_id.to_string();
    pipeline
        .ingest(&sleep_payload(&user, "2024-01-01T08:00:00Z", 28_800))
        .await;

    let delivery = pipeline
        .queue
        .receive(1, Duration::ZERO)
        .await
        .unwrap()
        .remove(0);
    let body = delivery.body.clone();
    assert_eq!(
        pipeline.worker.handle(delivery).await,
        merged(HealthCategory::Sleep, true)
    );

    let device = TestPipeline::device("oura");
    let before = pipeline.canonical.load_document(pipeline.user_id).await.unwrap();

    // At-least-once delivery: the same envelope arrives again
    pipeline.queue.enqueue(&body).await.unwrap();
    let outcomes = pipeline.worker.poll_once().await.unwrap();
    assert_eq!(outcomes, vec![merged(HealthCategory::Sleep, false)]);

    let after = pipeline.canonical.load_document(pipeline.user_id).await.unwrap();
    assert_eq!(before, after);
    assert!(after.unwrap().device(&device).is_some());
}

#[tokio::test]
async fn test_older_webhook_leaves_stored_record_unchanged() {
    let pipeline = TestPipeline::new();
    let user = pipeline.user_id.to_string();
    pipeline
        .ingest(&sleep_payload(&user, "2024-01-01T08:00:00Z", 28_800))
        .await;
    pipeline.worker.poll_once().await.unwrap();

    let stale_id = pipeline
        .ingest(&sleep_payload(&user, "2023-12-31T08:00:00Z", 25_200))
        .await;
    let outcomes = pipeline.worker.poll_once().await.unwrap();
    assert_eq!(outcomes, vec![merged(HealthCategory::Sleep, false)]);

    let stored = pipeline
        .canonical
        .load_category(
            pipeline.user_id,
            &TestPipeline::device("oura"),
            HealthCategory::Sleep,
        )
        .await
        .unwrap();
    let Some(CanonicalRecord::Sleep(sleep)) = stored else {
        panic!("sleep record missing");
    };
    assert_eq!(sleep.duration_minutes, Some(480));
    assert_eq!(sleep.last_updated, Some(at("2024-01-01T08:00:00Z")));

    // The stale webhook still reached a terminal state
    let row = pipeline.raw_webhooks.get(stale_id).await.unwrap().unwrap();
    assert!(row.processed);
}

#[tokio::test]
async fn test_newer_partial_webhook_keeps_unreported_fields() {
    let pipeline = TestPipeline::new();
    let user = pipeline.user_id.to_string();
    pipeline
        .ingest(&sleep_payload(&user, "2024-01-01T08:00:00Z", 28_800))
        .await;
    pipeline.worker.poll_once().await.unwrap();

    pipeline
        .ingest(&serde_json::json!({
            "data_structure": "sleep_summary",
            "user_id": user,
            "sleep_health": {"summary": {"sleep_summary": {
                "duration": {"sleep_duration_seconds_int": 27_000},
                "metadata": {
                    "datetime_string": "2024-01-02T08:00:00Z",
                    "sources_of_data_array": ["Oura"]
                }
            }}}
        }))
        .await;
    pipeline.worker.poll_once().await.unwrap();

    let Some(CanonicalRecord::Sleep(sleep)) = pipeline
        .canonical
        .load_category(
            pipeline.user_id,
            &TestPipeline::device("oura"),
            HealthCategory::Sleep,
        )
        .await
        .unwrap()
    else {
        panic!("sleep record missing");
    };
    assert_eq!(sleep.duration_minutes, Some(450));
    assert_eq!(sleep.hr_resting_bpm, Some(52));
    assert_eq!(sleep.last_updated, Some(at("2024-01-02T08:00:00Z")));
}

#[tokio::test]
async fn test_transient_failure_is_redelivered_then_succeeds() {
    // Two failures exhaust the in-process retry of the first delivery
    let pipeline = TestPipeline::with_canonical(Arc::new(FlakyCanonicalStore::new(2)));
    let user = pipeline.user_id.to_string();
    let raw_id = pipeline
        .ingest(&physical_payload(&user, "2024-01-01T20:00:00Z", 9_500))
        .await;

    let first = pipeline.worker.poll_once().await.unwrap();
    assert!(matches!(first.as_slice(), [ProcessingOutcome::Retry { .. }]));

    let depth = pipeline.queue.depth().await.unwrap();
    assert_eq!(depth.in_flight, 1, "message must not be deleted");
    let row = pipeline.raw_webhooks.get(raw_id).await.unwrap().unwrap();
    assert!(!row.processed);

    tokio::time::sleep(AFTER_VISIBILITY).await;
    let second = pipeline.worker.poll_once().await.unwrap();
    assert_eq!(second, vec![merged(HealthCategory::Physical, true)]);

    let depth = pipeline.queue.depth().await.unwrap();
    assert_eq!((depth.visible, depth.in_flight, depth.dead_lettered), (0, 0, 0));
    let row = pipeline.raw_webhooks.get(raw_id).await.unwrap().unwrap();
    assert!(row.processed);

    let stats = pipeline.stats.snapshot();
    assert_eq!((stats.received, stats.acked, stats.retried), (2, 1, 1));
}

#[tokio::test]
async fn test_persistent_transient_failure_is_dead_lettered_on_final_delivery() {
    let pipeline = TestPipeline::with_canonical(Arc::new(FlakyCanonicalStore::always_failing()));
    let user = pipeline.user_id.to_string();
    let raw_id = pipeline
        .ingest(&physical_payload(&user, "2024-01-01T20:00:00Z", 9_500))
        .await;

    for _ in 0..2 {
        let outcomes = pipeline.worker.poll_once().await.unwrap();
        assert!(matches!(outcomes.as_slice(), [ProcessingOutcome::Retry { .. }]));
        tokio::time::sleep(AFTER_VISIBILITY).await;
    }

    let last = pipeline.worker.poll_once().await.unwrap();
    assert!(matches!(last.as_slice(), [ProcessingOutcome::DeadLetter { .. }]));

    let dead = pipeline.queue.dead_letters(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].receive_count, 3);

    let row = pipeline.raw_webhooks.get(raw_id).await.unwrap().unwrap();
    assert!(!row.processed, "dead-lettered rows stay replayable");
    assert!(row.error.is_some());

    let depth = pipeline.queue.depth().await.unwrap();
    assert_eq!((depth.visible, depth.in_flight, depth.dead_lettered), (0, 0, 1));
}

#[tokio::test]
async fn test_permanent_failure_is_acknowledged_without_retry() {
    let pipeline = TestPipeline::with_canonical(Arc::new(FlakyCanonicalStore::with_code(
        1,
        ErrorCode::InvalidInput,
    )));
    let user = pipeline.user_id.to_string();
    let raw_id = pipeline
        .ingest(&physical_payload(&user, "2024-01-01T20:00:00Z", 9_500))
        .await;

    let outcomes = pipeline.worker.poll_once().await.unwrap();
    assert!(matches!(
        outcomes.as_slice(),
        [ProcessingOutcome::Acked {
            disposition: AckDisposition::Rejected { .. }
        }]
    ));

    let row = pipeline.raw_webhooks.get(raw_id).await.unwrap().unwrap();
    assert!(row.processed);
    assert!(row.error.is_some());
    assert_eq!(pipeline.queue.depth().await.unwrap().in_flight, 0);
}

#[tokio::test]
async fn test_unsupported_structure_is_rejected() {
    let pipeline = TestPipeline::new();
    let raw_id = pipeline
        .ingest(&serde_json::json!({
            "data_structure": "nutrition_summary",
            "user_id": pipeline.user_id.to_string(),
            "data_source": "Oura"
        }))
        .await;

    let outcomes = pipeline.worker.poll_once().await.unwrap();
    assert!(matches!(
        outcomes.as_slice(),
        [ProcessingOutcome::Acked {
            disposition: AckDisposition::Rejected { .. }
        }]
    ));

    let row = pipeline.raw_webhooks.get(raw_id).await.unwrap().unwrap();
    assert!(row.processed);
    assert!(row.error.unwrap().contains("nutrition_summary"));
}

#[tokio::test]
async fn test_payload_without_metrics_is_acknowledged_as_no_data() {
    let pipeline = TestPipeline::new();
    let raw_id = pipeline
        .ingest(&serde_json::json!({
            "data_structure": "sleep_summary",
            "user_id": pipeline.user_id.to_string(),
            "sleep_health": {"summary": {"sleep_summary": {
                "metadata": {
                    "datetime_string": "2024-01-01T08:00:00Z",
                    "sources_of_data_array": ["Oura"]
                }
            }}}
        }))
        .await;

    let outcomes = pipeline.worker.poll_once().await.unwrap();
    assert_eq!(
        outcomes,
        vec![ProcessingOutcome::Acked {
            disposition: AckDisposition::NoData
        }]
    );

    let row = pipeline.raw_webhooks.get(raw_id).await.unwrap().unwrap();
    assert!(row.processed);
    assert_eq!(row.error.as_deref(), Some(NO_DATA_ERROR));
    assert!(pipeline
        .canonical
        .load_document(pipeline.user_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_undecodable_envelope_is_removed() {
    let pipeline = TestPipeline::new();
    pipeline.queue.enqueue("{\"not\": \"an envelope\"}").await.unwrap();

    let outcomes = pipeline.worker.poll_once().await.unwrap();
    assert!(matches!(
        outcomes.as_slice(),
        [ProcessingOutcome::Acked {
            disposition: AckDisposition::Rejected { .. }
        }]
    ));
    let depth = pipeline.queue.depth().await.unwrap();
    assert_eq!((depth.visible, depth.in_flight, depth.dead_lettered), (0, 0, 0));
}

#[tokio::test]
async fn test_out_of_order_revoke_does_not_disconnect() {
    let pipeline = TestPipeline::new();
    let user = pipeline.user_id.to_string();

    pipeline
        .ingest_kind(
            WebhookKind::Notification,
            &notification_payload(&user, "Oura", true, "2024-01-02T08:00:00Z"),
        )
        .await;
    pipeline
        .ingest_kind(
            WebhookKind::Notification,
            &notification_payload(&user, "Oura", false, "2024-01-01T08:00:00Z"),
        )
        .await;

    let outcomes = pipeline.worker.poll_once().await.unwrap();
    assert_eq!(
        outcomes,
        vec![
            ProcessingOutcome::Acked {
                disposition: AckDisposition::ConnectionUpdated { changed: true }
            },
            ProcessingOutcome::Acked {
                disposition: AckDisposition::ConnectionUpdated { changed: false }
            },
        ]
    );

    let connection = pipeline
        .canonical
        .load_device(pipeline.user_id, &TestPipeline::device("oura"))
        .await
        .unwrap()
        .unwrap();
    assert!(connection.connected);
    assert_eq!(connection.connected_at, Some(at("2024-01-02T08:00:00Z")));
    assert_eq!(connection.revoked_at, None);
}

#[tokio::test]
async fn test_activity_events_are_unioned_across_webhooks() {
    let pipeline = TestPipeline::new();
    let user = pipeline.user_id.to_string();

    pipeline
        .ingest(&activity_payload(
            &user,
            &["2024-01-01T07:00:00Z", "2024-01-02T07:00:00Z"],
        ))
        .await;
    pipeline
        .ingest(&activity_payload(
            &user,
            &["2024-01-02T07:00:00Z", "2024-01-03T07:00:00Z"],
        ))
        .await;
    pipeline.worker.poll_once().await.unwrap();

    let Some(CanonicalRecord::ActivityEvents(events)) = pipeline
        .canonical
        .load_category(
            pipeline.user_id,
            &TestPipeline::device("polar"),
            HealthCategory::ActivityEvents,
        )
        .await
        .unwrap()
    else {
        panic!("activity events missing");
    };

    let starts: Vec<_> = events.iter().map(|event| event.start_time).collect();
    assert_eq!(
        starts,
        vec![
            at("2024-01-03T07:00:00Z"),
            at("2024-01-02T07:00:00Z"),
            at("2024-01-01T07:00:00Z"),
        ]
    );
}

#[tokio::test]
async fn test_concurrent_event_write_is_merged_not_overwritten() {
    let store = Arc::new(RacingCanonicalStore::new(CanonicalRecord::ActivityEvents(
        vec![activity_event("2024-01-05T07:00:00Z")],
    )));
    let pipeline = TestPipeline::with_canonical(store.clone());
    let user = pipeline.user_id.to_string();

    pipeline
        .ingest(&activity_payload(&user, &["2024-01-01T07:00:00Z"]))
        .await;
    let outcomes = pipeline.worker.poll_once().await.unwrap();
    assert_eq!(outcomes, vec![merged(HealthCategory::ActivityEvents, true)]);
    assert_eq!(store.conflicts(), 1);

    let Some(CanonicalRecord::ActivityEvents(events)) = pipeline
        .canonical
        .load_category(
            pipeline.user_id,
            &TestPipeline::device("polar"),
            HealthCategory::ActivityEvents,
        )
        .await
        .unwrap()
    else {
        panic!("activity events missing");
    };
    let starts: Vec<_> = events.iter().map(|event| event.start_time).collect();
    assert_eq!(
        starts,
        vec![at("2024-01-05T07:00:00Z"), at("2024-01-01T07:00:00Z")]
    );
}

#[tokio::test]
async fn test_worker_pool_drains_queue_and_stops_on_cancel() {
    let pipeline = TestPipeline::new();
    let user = pipeline.user_id.to_string();
    let raw_id = pipeline
        .ingest(&physical_payload(&user, "2024-01-01T20:00:00Z", 4_200))
        .await;

    let pool = WorkerPool::spawn(
        2,
        &healthsync_server::worker::WorkerContext {
            queue: pipeline.queue.clone(),
            raw_webhooks: pipeline.raw_webhooks.clone(),
            canonical: Arc::clone(&pipeline.canonical),
        },
        common::test_worker_settings(),
        CancellationToken::new(),
    );

    let mut processed = false;
    for _ in 0..100 {
        if pipeline
            .raw_webhooks
            .get(raw_id)
            .await
            .unwrap()
            .is_some_and(|row| row.processed)
        {
            processed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(processed, "worker pool never processed the webhook");

    pool.cancel();
    let stats = pool.join().await;
    assert_eq!(stats.acked, 1);
}
