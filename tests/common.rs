// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides logging setup, signed ROOK fixtures, in-memory pipelines, and failure-injecting stores
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::too_many_lines
)]
//! Shared test utilities for `healthsync_server`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use healthsync_providers::{SignatureVerifier, WebhookKind};
use healthsync_server::{
    config::{QueueBackend, QueueConfig, SignaturePolicy},
    errors::{AppError, AppResult, ErrorCode},
    ingress::{IngressOutcome, IngressService},
    models::{
        ActivityEvent, CanonicalRecord, ConnectionUpdate, DeviceConnection, DeviceSource,
        HealthCategory, UserHealthDocument,
    },
    queue::{InMemoryQueue, MessageQueue},
    storage::{
        CanonicalStateStore, InMemoryCanonicalStore, InMemoryRawWebhookStore,
        InMemoryUserDirectory, UserDirectory,
    },
    worker::{RetryPolicy, Worker, WorkerContext, WorkerSettings, WorkerStats},
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use uuid::Uuid;

static INIT_LOGGER: Once = Once::new();

/// Webhook secret shared by fixtures and the verifier
pub const TEST_SECRET: &str = "rook-test-secret";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            Ok("WARN" | "ERROR") | _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// `sha256=<hex>` header value for `body`
pub fn sign(body: &[u8]) -> String {
    let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, TEST_SECRET.as_bytes());
    let tag = ring::hmac::sign(&key, body);
    format!("sha256={}", hex::encode(tag.as_ref()))
}

/// Queue settings used by tests: short visibility, three deliveries
pub fn test_queue_config() -> QueueConfig {
    QueueConfig {
        backend: QueueBackend::Memory,
        visibility_timeout_secs: 1,
        max_receive_count: 3,
    }
}

/// Worker settings with no waiting and no in-process retry delay
pub fn test_worker_settings() -> WorkerSettings {
    WorkerSettings {
        batch_size: 10,
        receive_wait: Duration::ZERO,
        idle_backoff: Duration::from_millis(10),
        message_timeout: Duration::from_secs(5),
        shutdown_grace: Duration::from_secs(1),
        max_receive_count: 3,
        retry: RetryPolicy::new(2, Duration::from_millis(1)),
    }
}

// ============================================================================
// ROOK payload fixtures
// ============================================================================

/// Sleep summary as ROOK sends it
pub fn sleep_payload(user_id: &str, datetime: &str, duration_seconds: u64) -> Value {
    json!({
        "version": 2,
        "data_structure": "sleep_summary",
        "client_uuid": "c2f4ac3e-6a0c-4c47-a4ad-0a0b7f4b6a11",
        "user_id": user_id,
        "sleep_health": {
            "summary": {
                "sleep_summary": {
                    "duration": {
                        "sleep_start_datetime_string": "2024-01-14T23:10:00.000000Z",
                        "sleep_end_datetime_string": "2024-01-15T07:05:00.000000Z",
                        "sleep_date_string": "2024-01-15",
                        "sleep_duration_seconds_int": duration_seconds,
                        "time_in_bed_seconds_int": 28_500,
                        "deep_sleep_duration_seconds_int": 5_400
                    },
                    "scores": {
                        "sleep_efficiency_1_100_score_int": 91
                    },
                    "heart_rate": {
                        "hr_resting_bpm_int": 52,
                        "hrv_avg_rmssd_float": 48.5
                    },
                    "metadata": {
                        "datetime_string": datetime,
                        "sources_of_data_array": ["Oura"],
                        "was_the_user_under_physical_activity_bool": false
                    }
                }
            }
        }
    })
}

/// Physical summary carrying only the given step count
pub fn physical_payload(user_id: &str, datetime: &str, steps: u64) -> Value {
    json!({
        "data_structure": "physical_summary",
        "user_id": user_id,
        "data_source": "Garmin",
        "physical_health": {
            "summary": {
                "physical_summary": {
                    "distance": {"steps_int": steps},
                    "metadata": {
                        "datetime_string": datetime,
                        "sources_of_data_array": ["Garmin"]
                    }
                }
            }
        }
    })
}

/// Body summary with a weight reading
pub fn body_payload(user_id: &str, datetime: &str, weight_kg: f64) -> Value {
    json!({
        "data_structure": "body_summary",
        "user_id": user_id,
        "body_health": {
            "summary": {
                "body_summary": {
                    "body_metrics": {"weight_kg_float": weight_kg},
                    "metadata": {
                        "datetime_string": datetime,
                        "sources_of_data_array": ["Withings"]
                    }
                }
            }
        }
    })
}

/// Activity event payload with one event per start time
pub fn activity_payload(user_id: &str, starts: &[&str]) -> Value {
    let events: Vec<Value> = starts
        .iter()
        .map(|start| {
            json!({
                "activity": {
                    "activity_start_datetime_string": start,
                    "activity_duration_seconds_int": 1_800,
                    "activity_type_name_string": "Running"
                },
                "calories": {"calories_expenditure_kcal_float": 320.5},
                "metadata": {
                    "datetime_string": start,
                    "sources_of_data_array": ["Polar"]
                }
            })
        })
        .collect();

    json!({
        "data_structure": "activity_event",
        "user_id": user_id,
        "physical_health": {"events": {"activity_event": events}}
    })
}

/// Connect/revoke notification
pub fn notification_payload(user_id: &str, source: &str, authorized: bool, timestamp: &str) -> Value {
    json!({
        "user_id": user_id,
        "data_source": source,
        "authorized": authorized,
        "timestamp": timestamp
    })
}

// ============================================================================
// In-memory pipeline
// ============================================================================

/// Ingress, queue, and worker wired to in-memory backends
pub struct TestPipeline {
    pub user_id: Uuid,
    pub raw_webhooks: Arc<InMemoryRawWebhookStore>,
    pub canonical: Arc<dyn CanonicalStateStore>,
    pub users: Arc<InMemoryUserDirectory>,
    pub queue: Arc<InMemoryQueue>,
    pub ingress: IngressService,
    pub worker: Worker,
    pub stats: Arc<WorkerStats>,
}

impl TestPipeline {
    /// Pipeline with one registered user and signature enforcement
    pub fn new() -> Self {
        Self::with_policy(SignaturePolicy::Enforce)
    }

    /// Pipeline with an explicit signature policy
    pub fn with_policy(policy: SignaturePolicy) -> Self {
        Self::build(policy, Arc::new(InMemoryCanonicalStore::new()))
    }

    /// Pipeline whose worker writes to `canonical`
    pub fn with_canonical(canonical: Arc<dyn CanonicalStateStore>) -> Self {
        Self::build(SignaturePolicy::Enforce, canonical)
    }

    fn build(policy: SignaturePolicy, canonical: Arc<dyn CanonicalStateStore>) -> Self {
        init_test_logging();
        let user_id = Uuid::new_v4();
        let raw_webhooks = Arc::new(InMemoryRawWebhookStore::new());
        let users = Arc::new(InMemoryUserDirectory::with_users([user_id]));
        let queue = Arc::new(InMemoryQueue::new(&test_queue_config()));
        let stats = Arc::new(WorkerStats::default());

        let ingress = IngressService::new(
            raw_webhooks.clone(),
            queue.clone(),
            users.clone(),
            SignatureVerifier::new(Some(TEST_SECRET)),
            policy,
        );
        let worker = Worker::new(
            0,
            WorkerContext {
                queue: queue.clone(),
                raw_webhooks: raw_webhooks.clone(),
                canonical: Arc::clone(&canonical),
            },
            test_worker_settings(),
            Arc::clone(&stats),
        );

        Self {
            user_id,
            raw_webhooks,
            canonical,
            users,
            queue,
            ingress,
            worker,
            stats,
        }
    }

    /// Sign and submit a health data payload, returning the raw webhook id
    pub async fn ingest(&self, payload: &Value) -> Uuid {
        self.ingest_kind(WebhookKind::HealthData, payload).await
    }

    /// Sign and submit a payload of the given kind, returning the raw webhook id
    pub async fn ingest_kind(&self, kind: WebhookKind, payload: &Value) -> Uuid {
        let body = serde_json::to_vec(payload).unwrap();
        match self.ingress.receive(kind, &body, Some(&sign(&body))).await {
            IngressOutcome::Accepted { raw_webhook_id, .. } => raw_webhook_id,
            other => panic!("webhook not accepted: {other:?}"),
        }
    }

    /// Device key used by fixtures
    pub fn device(source: &str) -> DeviceSource {
        DeviceSource::parse(source).unwrap()
    }

    /// Register an additional user
    pub async fn register(&self, user_id: Uuid) {
        self.users.register_user(user_id).await.unwrap();
    }
}

/// Canonical running session starting at `start`
pub fn activity_event(start: &str) -> ActivityEvent {
    ActivityEvent {
        start_time: at(start),
        end_time: None,
        activity_type: Some("running".into()),
        duration_minutes: Some(30),
        calories_kcal: Some(320.5),
        distance_meters: Some(5_000.0),
        steps: None,
        hr_avg_bpm: Some(148),
        hr_max_bpm: None,
        last_updated: Some(at(start)),
    }
}

/// Parse a fixed RFC 3339 test timestamp
pub fn at(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .unwrap()
        .with_timezone(&Utc)
}

// ============================================================================
// Failure injection
// ============================================================================

/// Canonical store that fails the first `failures` writes with a transient error
pub struct FlakyCanonicalStore {
    inner: InMemoryCanonicalStore,
    failures_left: AtomicU32,
    code: ErrorCode,
}

impl FlakyCanonicalStore {
    /// Fail `failures` writes with `StorageUnavailable`
    pub fn new(failures: u32) -> Self {
        Self::with_code(failures, ErrorCode::StorageUnavailable)
    }

    /// Fail `failures` writes with `code`
    pub fn with_code(failures: u32, code: ErrorCode) -> Self {
        Self {
            inner: InMemoryCanonicalStore::new(),
            failures_left: AtomicU32::new(failures),
            code,
        }
    }

    /// Fail every write
    pub fn always_failing() -> Self {
        Self::new(u32::MAX)
    }

    fn inject(&self) -> AppResult<()> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::new(self.code, "injected storage failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl CanonicalStateStore for FlakyCanonicalStore {
    async fn load_category(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
        category: HealthCategory,
    ) -> AppResult<Option<CanonicalRecord>> {
        self.inner.load_category(user_id, device, category).await
    }

    async fn store_category(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
        expected: Option<&CanonicalRecord>,
        record: &CanonicalRecord,
        synced_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.inject()?;
        self.inner
            .store_category(user_id, device, expected, record, synced_at)
            .await
    }

    async fn apply_connection_update(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
        update: ConnectionUpdate,
    ) -> AppResult<bool> {
        self.inject()?;
        self.inner
            .apply_connection_update(user_id, device, update)
            .await
    }

    async fn load_device(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
    ) -> AppResult<Option<DeviceConnection>> {
        self.inner.load_device(user_id, device).await
    }

    async fn load_document(&self, user_id: Uuid) -> AppResult<Option<UserHealthDocument>> {
        self.inner.load_document(user_id).await
    }
}

/// Canonical store where another writer commits right after the first load
///
/// The first `load_category` returns the state as it was, then writes
/// `concurrent` into the same category the way a second worker would.
pub struct RacingCanonicalStore {
    inner: InMemoryCanonicalStore,
    concurrent: Mutex<Option<CanonicalRecord>>,
    conflicts: AtomicU32,
}

impl RacingCanonicalStore {
    pub fn new(concurrent: CanonicalRecord) -> Self {
        Self {
            inner: InMemoryCanonicalStore::new(),
            concurrent: Mutex::new(Some(concurrent)),
            conflicts: AtomicU32::new(0),
        }
    }

    /// Writes refused because the category changed since it was loaded
    pub fn conflicts(&self) -> u32 {
        self.conflicts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CanonicalStateStore for RacingCanonicalStore {
    async fn load_category(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
        category: HealthCategory,
    ) -> AppResult<Option<CanonicalRecord>> {
        let snapshot = self.inner.load_category(user_id, device, category).await?;
        let concurrent = self.concurrent.lock().unwrap().take();
        if let Some(record) = concurrent {
            self.inner
                .store_category(user_id, device, snapshot.as_ref(), &record, Utc::now())
                .await?;
        }
        Ok(snapshot)
    }

    async fn store_category(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
        expected: Option<&CanonicalRecord>,
        record: &CanonicalRecord,
        synced_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let stored = self
            .inner
            .store_category(user_id, device, expected, record, synced_at)
            .await?;
        if !stored {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(stored)
    }

    async fn apply_connection_update(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
        update: ConnectionUpdate,
    ) -> AppResult<bool> {
        self.inner
            .apply_connection_update(user_id, device, update)
            .await
    }

    async fn load_device(
        &self,
        user_id: Uuid,
        device: &DeviceSource,
    ) -> AppResult<Option<DeviceConnection>> {
        self.inner.load_device(user_id, device).await
    }

    async fn load_document(&self, user_id: Uuid) -> AppResult<Option<UserHealthDocument>> {
        self.inner.load_document(user_id).await
    }
}

/// Queue that refuses every enqueue
pub struct UnavailableQueue;

#[async_trait]
impl MessageQueue for UnavailableQueue {
    async fn enqueue(&self, _body: &str) -> AppResult<String> {
        Err(AppError::queue_unavailable("queue offline"))
    }

    async fn receive(
        &self,
        _max: u32,
        _wait: Duration,
    ) -> AppResult<Vec<healthsync_server::queue::ReceivedMessage>> {
        Err(AppError::queue_unavailable("queue offline"))
    }

    async fn delete(&self, _receipt_handle: &str) -> AppResult<()> {
        Err(AppError::queue_unavailable("queue offline"))
    }

    async fn dead_letter(&self, _receipt_handle: &str, _reason: &str) -> AppResult<()> {
        Err(AppError::queue_unavailable("queue offline"))
    }

    async fn dead_letters(&self, _limit: u32) -> AppResult<Vec<healthsync_server::queue::DeadLetter>> {
        Err(AppError::queue_unavailable("queue offline"))
    }

    async fn redrive(&self, _message_id: &str) -> AppResult<()> {
        Err(AppError::queue_unavailable("queue offline"))
    }

    async fn depth(&self) -> AppResult<healthsync_server::queue::QueueDepth> {
        Err(AppError::queue_unavailable("queue offline"))
    }
}
