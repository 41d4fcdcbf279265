// ABOUTME: Queue consumer that transforms, merges, and persists webhook payloads
// ABOUTME: Each delivery yields an explicit ProcessingOutcome deciding ack, redelivery, or dead-letter
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Consumer Worker
//!
//! One [`Worker`] runs a sequential poll/process loop. Every delivery moves
//! through [`ProcessingStage`]s and ends in a [`ProcessingOutcome`]:
//!
//! - `Acked`: the raw row is marked processed and the message deleted. This
//!   covers successful merges, payloads without usable data, and permanent
//!   failures that no retry could fix.
//! - `Retry`: a transient failure. The message is left alone and becomes
//!   visible again after the visibility timeout.
//! - `DeadLetter`: a transient failure on the last permitted delivery. The
//!   raw row records the error and the message is parked.
//!
//! Merges are recency guarded and idempotent, so redelivery after a crash
//! between persisting and deleting is harmless. Category writes are
//! compare-and-set: a worker that loses a race with another writer reloads
//! the category and merges again.

mod pool;
mod retry;

pub use pool::WorkerPool;
pub use retry::RetryPolicy;

use crate::config::{QueueConfig, WorkerConfig};
use crate::constants::queue::MAX_STORE_CONFLICTS;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::logging::AppLogger;
use crate::models::{DataStructure, DeviceSource, HealthCategory, QueueMessage};
use crate::queue::{MessageQueue, ReceivedMessage};
use crate::storage::{CanonicalStateStore, RawWebhookStore};
use healthsync_providers::rook::resolve_user_id;
use healthsync_providers::RookTransformer;
use healthsync_reconcile::merge;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Raw-row error recorded when a payload carries nothing to merge
pub const NO_DATA_ERROR: &str = "no extractable data";

/// Where a delivery currently is, recorded on the message span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Envelope decoded
    Received,
    /// Provider payload being converted to a canonical record
    Transforming,
    /// Stored record loaded and merged
    Merging,
    /// Result being written
    Persisting,
}

impl ProcessingStage {
    /// Span field value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Transforming => "transforming",
            Self::Merging => "merging",
            Self::Persisting => "persisting",
        }
    }

    fn enter(self) {
        Span::current().record("stage", self.as_str());
    }
}

/// Why a message was acknowledged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckDisposition {
    /// A canonical category was merged
    Merged {
        /// Category written
        category: HealthCategory,
        /// False when the merge left the stored record as it was
        changed: bool,
    },
    /// A connect/revoke notification was applied
    ConnectionUpdated {
        /// False when the notification was older than the applied state
        changed: bool,
    },
    /// Nothing usable in the payload
    NoData,
    /// Permanent failure
    Rejected {
        /// Error recorded on the raw row
        reason: String,
    },
}

impl AckDisposition {
    /// Error to record on the raw row, if any
    #[must_use]
    pub fn raw_error(&self) -> Option<&str> {
        match self {
            Self::Merged { .. } | Self::ConnectionUpdated { .. } => None,
            Self::NoData => Some(NO_DATA_ERROR),
            Self::Rejected { reason } => Some(reason.as_str()),
        }
    }
}

/// Result of handling one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Message deleted, raw row terminal
    Acked {
        /// What happened
        disposition: AckDisposition,
    },
    /// Left for redelivery
    Retry {
        /// Transient error
        error: String,
    },
    /// Parked in the dead-letter channel
    DeadLetter {
        /// Last transient error
        error: String,
    },
}

impl ProcessingOutcome {
    /// Whether the message was removed from the queue for good
    #[must_use]
    pub const fn is_acked(&self) -> bool {
        matches!(self, Self::Acked { .. })
    }
}

impl fmt::Display for ProcessingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acked {
                disposition: AckDisposition::Merged { category, .. },
            } => write!(f, "acked:merged:{category}"),
            Self::Acked {
                disposition: AckDisposition::ConnectionUpdated { .. },
            } => f.write_str("acked:connection_updated"),
            Self::Acked {
                disposition: AckDisposition::NoData,
            } => f.write_str("acked:no_data"),
            Self::Acked {
                disposition: AckDisposition::Rejected { .. },
            } => f.write_str("acked:rejected"),
            Self::Retry { .. } => f.write_str("retry"),
            Self::DeadLetter { .. } => f.write_str("dead_letter"),
        }
    }
}

/// Counters shared by the workers of one pool
#[derive(Debug, Default)]
pub struct WorkerStats {
    received: AtomicU64,
    acked: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    /// Deliveries handled
    pub received: u64,
    /// Deliveries acknowledged
    pub acked: u64,
    /// Deliveries left for redelivery
    pub retried: u64,
    /// Deliveries parked
    pub dead_lettered: u64,
}

impl WorkerStats {
    fn record(&self, outcome: &ProcessingOutcome) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            ProcessingOutcome::Acked { .. } => &self.acked,
            ProcessingOutcome::Retry { .. } => &self.retried,
            ProcessingOutcome::DeadLetter { .. } => &self.dead_lettered,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values
    #[must_use]
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

/// Storage and queue handles a worker operates on
#[derive(Clone)]
pub struct WorkerContext {
    /// Queue to consume
    pub queue: Arc<dyn MessageQueue>,
    /// Raw webhook audit log
    pub raw_webhooks: Arc<dyn RawWebhookStore>,
    /// Canonical per-user state
    pub canonical: Arc<dyn CanonicalStateStore>,
}

/// Timing and retry settings of a worker
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Messages claimed per poll
    pub batch_size: u32,
    /// Long-poll wait
    pub receive_wait: Duration,
    /// Sleep after an empty poll or a receive error
    pub idle_backoff: Duration,
    /// Deadline for one message
    pub message_timeout: Duration,
    /// Time the in-flight message may take after shutdown is requested
    pub shutdown_grace: Duration,
    /// Deliveries before a transient failure dead-letters the message
    pub max_receive_count: u32,
    /// In-process retry of storage calls
    pub retry: RetryPolicy,
}

impl WorkerSettings {
    /// Settings from the service configuration
    #[must_use]
    pub fn from_config(worker: &WorkerConfig, queue: &QueueConfig) -> Self {
        Self {
            batch_size: worker.batch_size.max(1),
            receive_wait: worker.receive_wait(),
            idle_backoff: worker.idle_backoff(),
            message_timeout: worker.message_timeout(),
            shutdown_grace: worker.shutdown_grace(),
            max_receive_count: queue.max_receive_count.max(1),
            retry: RetryPolicy::new(
                worker.retry_attempts,
                Duration::from_millis(worker.retry_delay_ms),
            ),
        }
    }
}

/// Sequential queue consumer
pub struct Worker {
    id: usize,
    context: WorkerContext,
    settings: WorkerSettings,
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Create a worker
    #[must_use]
    pub fn new(
        id: usize,
        context: WorkerContext,
        settings: WorkerSettings,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            id,
            context,
            settings,
            stats,
        }
    }

    /// Poll and process until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(worker_id = self.id, "Worker starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let received = tokio::select! {
                received = self
                    .context
                    .queue
                    .receive(self.settings.batch_size, self.settings.receive_wait) => received,
                () = shutdown.cancelled() => break,
            };

            match received {
                Ok(messages) if messages.is_empty() => {}
                Ok(messages) => {
                    for message in messages {
                        if shutdown.is_cancelled() {
                            // Unprocessed deliveries reappear after the visibility timeout
                            break;
                        }
                        self.handle_with_grace(message, &shutdown).await;
                    }
                    continue;
                }
                Err(e) => {
                    error!(worker_id = self.id, error = %e, "Queue receive failed");
                }
            }

            tokio::select! {
                () = tokio::time::sleep(self.settings.idle_backoff) => {}
                () = shutdown.cancelled() => break,
            }
        }

        info!(worker_id = self.id, "Worker stopped");
    }

    /// Poll once and handle whatever arrives
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read
    pub async fn poll_once(&self) -> AppResult<Vec<ProcessingOutcome>> {
        let messages = self
            .context
            .queue
            .receive(self.settings.batch_size, self.settings.receive_wait)
            .await?;

        let mut outcomes = Vec::with_capacity(messages.len());
        for message in messages {
            outcomes.push(self.handle(message).await);
        }
        Ok(outcomes)
    }

    async fn handle_with_grace(
        &self,
        message: ReceivedMessage,
        shutdown: &CancellationToken,
    ) -> Option<ProcessingOutcome> {
        let message_id = message.id.clone();
        let handling = self.handle(message);
        tokio::pin!(handling);

        tokio::select! {
            outcome = &mut handling => Some(outcome),
            () = shutdown.cancelled() => {
                if let Ok(outcome) = timeout(self.settings.shutdown_grace, &mut handling).await {
                    Some(outcome)
                } else {
                    warn!(worker_id = self.id, queue.message_id = %message_id, "Shutdown grace expired, message left for redelivery");
                    None
                }
            }
        }
    }

    /// Handle one delivery end to end
    pub async fn handle(&self, message: ReceivedMessage) -> ProcessingOutcome {
        let span = info_span!(
            "queue_message",
            worker_id = self.id,
            message_id = %message.id,
            receive_count = message.receive_count,
            stage = tracing::field::Empty,
        );

        async {
            let started = Instant::now();
            let (raw_id, outcome) = self.handle_inner(&message).await;
            self.stats.record(&outcome);

            AppLogger::log_message_outcome(
                &message.id,
                raw_id.map(|id| id.to_string()).as_deref(),
                &outcome.to_string(),
                message.receive_count,
                started.elapsed().as_millis() as u64,
            );
            outcome
        }
        .instrument(span)
        .await
    }

    async fn handle_inner(&self, message: &ReceivedMessage) -> (Option<Uuid>, ProcessingOutcome) {
        ProcessingStage::Received.enter();

        let envelope = match QueueMessage::from_body(&message.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                // No raw row to update: the body does not say which one it was
                warn!(error = %e, "Rejecting undecodable queue message");
                let disposition = AckDisposition::Rejected {
                    reason: e.to_string(),
                };
                return (None, self.acknowledge(message, None, disposition).await);
            }
        };
        let raw_id = envelope.raw_webhook_id;

        let result = timeout(self.settings.message_timeout, self.process(&envelope))
            .await
            .unwrap_or_else(|_| {
                Err(AppError::new(
                    ErrorCode::ResourceUnavailable,
                    format!(
                        "Processing exceeded {}ms deadline",
                        self.settings.message_timeout.as_millis()
                    ),
                ))
            });

        let outcome = match result {
            Ok(disposition) => self.acknowledge(message, Some(raw_id), disposition).await,
            Err(e) if e.is_transient() => self.defer(message, raw_id, &e).await,
            Err(e) => {
                warn!(error = %e, "Permanent processing failure");
                let disposition = AckDisposition::Rejected {
                    reason: e.to_string(),
                };
                self.acknowledge(message, Some(raw_id), disposition).await
            }
        };
        (Some(raw_id), outcome)
    }

    /// Transform, merge, and persist one envelope
    async fn process(&self, envelope: &QueueMessage) -> AppResult<AckDisposition> {
        let user_id = resolve_user_id(&envelope.user_id).ok_or_else(|| {
            AppError::invalid_input(format!("Malformed user reference: {}", envelope.user_id))
        })?;
        let device = DeviceSource::parse(&envelope.device_source)?;
        let structure = DataStructure::parse(&envelope.data_structure).ok_or_else(|| {
            AppError::invalid_input(format!(
                "Unsupported data structure: {}",
                envelope.data_structure
            ))
        })?;

        ProcessingStage::Transforming.enter();
        if structure == DataStructure::ConnectionUpdate {
            let Some(update) =
                RookTransformer::connection_update(&envelope.payload, envelope.received_at)
            else {
                return Ok(AckDisposition::NoData);
            };

            ProcessingStage::Persisting.enter();
            let canonical = &self.context.canonical;
            let changed = self
                .settings
                .retry
                .run("apply_connection_update", || {
                    canonical.apply_connection_update(user_id, &device, update)
                })
                .await?;
            return Ok(AckDisposition::ConnectionUpdated { changed });
        }

        let Some(incoming) = RookTransformer::transform_structure(structure, &envelope.payload)
        else {
            return Ok(AckDisposition::NoData);
        };
        let category = incoming.category();

        let canonical = &self.context.canonical;
        for attempt in 1..=MAX_STORE_CONFLICTS {
            ProcessingStage::Merging.enter();
            let existing = self
                .settings
                .retry
                .run("load_category", || {
                    canonical.load_category(user_id, &device, category)
                })
                .await?;
            let merged = merge(existing.clone(), incoming.clone());

            if existing.as_ref() == Some(&merged) {
                debug!(%category, "Merge left stored record unchanged");
                return Ok(AckDisposition::Merged {
                    category,
                    changed: false,
                });
            }

            ProcessingStage::Persisting.enter();
            let synced_at = chrono::Utc::now();
            let stored = self
                .settings
                .retry
                .run("store_category", || {
                    canonical.store_category(
                        user_id,
                        &device,
                        existing.as_ref(),
                        &merged,
                        synced_at,
                    )
                })
                .await?;

            if stored {
                return Ok(AckDisposition::Merged {
                    category,
                    changed: true,
                });
            }
            debug!(%category, attempt, "Category changed since load, merging again");
        }

        Err(AppError::new(
            ErrorCode::ResourceUnavailable,
            format!("{category} kept changing under concurrent writers"),
        ))
    }

    /// Mark the raw row terminal, then delete the message
    async fn acknowledge(
        &self,
        message: &ReceivedMessage,
        raw_id: Option<Uuid>,
        disposition: AckDisposition,
    ) -> ProcessingOutcome {
        if let Some(raw_id) = raw_id {
            let raw_webhooks = &self.context.raw_webhooks;
            let marked = self
                .settings
                .retry
                .run("mark_processed", || {
                    raw_webhooks.mark_processed(raw_id, disposition.raw_error())
                })
                .await;

            match marked {
                Ok(()) => {}
                Err(e) if e.is_transient() => return self.defer(message, raw_id, &e).await,
                Err(e) => warn!(raw_webhook_id = %raw_id, error = %e, "Raw webhook row not updated"),
            }
        }

        if let Err(e) = self.context.queue.delete(&message.receipt_handle).await {
            // The merge is idempotent, so redelivery only repeats work
            error!(error = %e, "Failed to delete acknowledged message");
            return ProcessingOutcome::Retry {
                error: e.to_string(),
            };
        }

        ProcessingOutcome::Acked { disposition }
    }

    /// Leave the message for redelivery, or park it on its last delivery
    async fn defer(
        &self,
        message: &ReceivedMessage,
        raw_id: Uuid,
        error: &AppError,
    ) -> ProcessingOutcome {
        let reason = error.to_string();
        if message.receive_count < self.settings.max_receive_count {
            warn!(error = %error, "Transient failure, leaving message for redelivery");
            return ProcessingOutcome::Retry { error: reason };
        }

        error!(error = %error, "Transient failure on final delivery, dead-lettering");
        if let Err(e) = self.context.raw_webhooks.mark_failed(raw_id, &reason).await {
            warn!(raw_webhook_id = %raw_id, error = %e, "Failed to record error on raw webhook");
        }
        if let Err(e) = self
            .context
            .queue
            .dead_letter(&message.receipt_handle, &reason)
            .await
        {
            // The receive bound parks it on the next claim instead
            error!(error = %e, "Failed to dead-letter message");
        }

        ProcessingOutcome::DeadLetter { error: reason }
    }
}
