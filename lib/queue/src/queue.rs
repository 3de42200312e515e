//! The visibility-timeout queue seam and an in-memory implementation.

use crate::error::QueueError;
use crate::message::QueueMessage;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// A queue with lease semantics.
///
/// `read` hides returned messages from other consumers for the
/// visibility timeout instead of removing them; only `delete` removes a
/// message permanently. A consumer that dies mid-task lets the lease
/// lapse and the message is redelivered.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueues a payload, returning the queue's message id.
    async fn send(&self, payload: JsonValue) -> Result<i64, QueueError>;

    /// Reads up to `batch_size` visible messages, leasing each for
    /// `visibility_timeout`.
    async fn read(
        &self,
        visibility_timeout: Duration,
        batch_size: usize,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Permanently removes a message. Returns false if it was already
    /// gone, which is not an error.
    async fn delete(&self, msg_id: i64) -> Result<bool, QueueError>;
}

struct QueueEntry {
    msg_id: i64,
    payload: JsonValue,
    read_count: i64,
    visible_at: Instant,
}

#[derive(Default)]
struct QueueState {
    next_id: i64,
    entries: Vec<QueueEntry>,
}

/// In-memory queue with real lease semantics, for tests and local runs.
///
/// Uses the tokio clock, so paused-time tests can advance leases
/// deterministically.
#[derive(Default)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
}

impl InMemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages still in the queue, leased or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, QueueState>, QueueError> {
        self.state.lock().map_err(|_| QueueError::QueueUnavailable {
            message: "queue state poisoned".to_string(),
        })
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    async fn send(&self, payload: JsonValue) -> Result<i64, QueueError> {
        let mut state = self.lock()?;
        state.next_id += 1;
        let msg_id = state.next_id;
        state.entries.push(QueueEntry {
            msg_id,
            payload,
            read_count: 0,
            visible_at: Instant::now(),
        });
        Ok(msg_id)
    }

    async fn read(
        &self,
        visibility_timeout: Duration,
        batch_size: usize,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let now = Instant::now();
        let mut state = self.lock()?;

        let mut batch = Vec::new();
        for entry in &mut state.entries {
            if batch.len() == batch_size {
                break;
            }
            if entry.visible_at > now {
                continue;
            }
            entry.visible_at = now + visibility_timeout;
            entry.read_count += 1;
            batch.push(QueueMessage {
                msg_id: entry.msg_id,
                payload: entry.payload.clone(),
                read_count: entry.read_count,
            });
        }
        Ok(batch)
    }

    async fn delete(&self, msg_id: i64) -> Result<bool, QueueError> {
        let mut state = self.lock()?;
        let before = state.entries.len();
        state.entries.retain(|entry| entry.msg_id != msg_id);
        Ok(state.entries.len() < before)
    }
}
