// ABOUTME: Queue and consumer worker defaults for at-least-once delivery
// ABOUTME: Visibility timeout must exceed worst-case processing time of one message
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Default visibility timeout in seconds
pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: u64 = 60;

/// Deliveries allowed before a message is moved to the dead-letter channel
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 3;

/// Default long-poll wait in seconds
pub const DEFAULT_RECEIVE_WAIT_SECS: u64 = 5;

/// Upper bound on the long-poll wait in seconds
pub const MAX_RECEIVE_WAIT_SECS: u64 = 20;

/// Messages claimed per poll; one keeps per-user ordering predictable
pub const DEFAULT_BATCH_SIZE: u32 = 1;

/// Interval between empty-queue checks during a long poll, in milliseconds
pub const LONG_POLL_INTERVAL_MS: u64 = 200;

/// Sleep after an empty poll or a receive error, in milliseconds
pub const DEFAULT_IDLE_BACKOFF_MS: u64 = 1_000;

/// In-process attempts per storage call before falling back to redelivery
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Fixed delay between in-process attempts, in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 250;

/// Time allowed for the in-flight message to finish after shutdown is requested
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

/// Default number of consumer tasks per worker process
pub const DEFAULT_WORKER_COUNT: usize = 1;

/// Deadline for processing one message, in seconds; must stay below the
/// visibility timeout so a slow message is not claimed twice
pub const DEFAULT_MESSAGE_TIMEOUT_SECS: u64 = 30;

/// Reload-and-merge rounds when a concurrent writer changes the same category
pub const MAX_STORE_CONFLICTS: u32 = 5;
