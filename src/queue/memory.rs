// ABOUTME: In-process queue with visibility timeouts and a dead-letter list
// ABOUTME: Long polls are woken by enqueue through a Notify; used by tests and single-process runs

use super::{
    DeadLetter, MessageQueue, QueueDepth, ReceivedMessage, MAX_RECEIVE_COUNT_EXCEEDED,
};
use crate::config::QueueConfig;
use crate::constants::queue::LONG_POLL_INTERVAL_MS;
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug)]
struct StoredMessage {
    id: String,
    body: String,
    receive_count: u32,
    visible_at: Instant,
    receipt_handle: Option<String>,
}

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<StoredMessage>,
    dead: Vec<DeadLetter>,
}

impl QueueState {
    fn park(&mut self, message: StoredMessage, reason: &str) {
        self.dead.push(DeadLetter {
            id: message.id,
            body: message.body,
            receive_count: message.receive_count,
            reason: reason.to_owned(),
            dead_lettered_at: Utc::now(),
        });
    }

    fn take_by_receipt(&mut self, receipt_handle: &str) -> Option<StoredMessage> {
        let index = self
            .messages
            .iter()
            .position(|m| m.receipt_handle.as_deref() == Some(receipt_handle))?;
        self.messages.remove(index)
    }
}

/// Queue held in process memory
#[derive(Debug)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    visibility_timeout: Duration,
    max_receive_count: u32,
}

impl InMemoryQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            visibility_timeout: config.visibility_timeout(),
            max_receive_count: config.max_receive_count,
        }
    }

    async fn claim(&self, max: u32) -> Vec<ReceivedMessage> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let (exhausted, remaining): (VecDeque<_>, VecDeque<_>) =
            std::mem::take(&mut state.messages)
                .into_iter()
                .partition(|m| m.visible_at <= now && m.receive_count >= self.max_receive_count);
        state.messages = remaining;
        for message in exhausted {
            warn!(queue.message_id = %message.id, receive_count = message.receive_count, "Dead-lettering exhausted message");
            state.park(message, MAX_RECEIVE_COUNT_EXCEEDED);
        }

        state
            .messages
            .iter_mut()
            .filter(|m| m.visible_at <= now)
            .take(max as usize)
            .map(|message| {
                message.receive_count += 1;
                message.visible_at = now + self.visibility_timeout;
                let receipt = format!(
                    "{}:{}:{}",
                    message.id,
                    message.receive_count,
                    Uuid::new_v4().simple()
                );
                message.receipt_handle = Some(receipt.clone());
                ReceivedMessage {
                    id: message.id.clone(),
                    receipt_handle: receipt,
                    body: message.body.clone(),
                    receive_count: message.receive_count,
                }
            })
            .collect()
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn enqueue(&self, body: &str) -> AppResult<String> {
        let id = Uuid::new_v4().to_string();
        self.state.lock().await.messages.push_back(StoredMessage {
            id: id.clone(),
            body: body.to_owned(),
            receive_count: 0,
            visible_at: Instant::now(),
            receipt_handle: None,
        });
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn receive(&self, max: u32, wait: Duration) -> AppResult<Vec<ReceivedMessage>> {
        let deadline = Instant::now() + wait;
        let poll_interval = Duration::from_millis(LONG_POLL_INTERVAL_MS);

        loop {
            let messages = self.claim(max.max(1)).await;
            let now = Instant::now();
            if !messages.is_empty() || now >= deadline {
                return Ok(messages);
            }

            // Wake on enqueue, or periodically for messages whose visibility expired
            let nap = poll_interval.min(deadline - now);
            tokio::select! {
                () = self.notify.notified() => {}
                () = tokio::time::sleep(nap) => {}
            }
        }
    }

    async fn delete(&self, receipt_handle: &str) -> AppResult<()> {
        if self
            .state
            .lock()
            .await
            .take_by_receipt(receipt_handle)
            .is_none()
        {
            debug!(queue.receipt = %receipt_handle, "Delete ignored for stale receipt");
        }
        Ok(())
    }

    async fn dead_letter(&self, receipt_handle: &str, reason: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        match state.take_by_receipt(receipt_handle) {
            Some(message) => state.park(message, reason),
            None => debug!(queue.receipt = %receipt_handle, "Dead-letter ignored for stale receipt"),
        }
        Ok(())
    }

    async fn dead_letters(&self, limit: u32) -> AppResult<Vec<DeadLetter>> {
        Ok(self
            .state
            .lock()
            .await
            .dead
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn redrive(&self, message_id: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let index = state
            .dead
            .iter()
            .position(|d| d.id == message_id)
            .ok_or_else(|| AppError::not_found(format!("Dead-lettered message {message_id}")))?;
        let letter = state.dead.remove(index);
        state.messages.push_back(StoredMessage {
            id: letter.id,
            body: letter.body,
            receive_count: 0,
            visible_at: Instant::now(),
            receipt_handle: None,
        });
        drop(state);

        self.notify.notify_waiters();
        Ok(())
    }

    async fn depth(&self) -> AppResult<QueueDepth> {
        let state = self.state.lock().await;
        let now = Instant::now();
        let visible = state.messages.iter().filter(|m| m.visible_at <= now).count();

        Ok(QueueDepth {
            visible: visible as u64,
            in_flight: (state.messages.len() - visible) as u64,
            dead_lettered: state.dead.len() as u64,
        })
    }
}
