//! Error types for queue consumption.

use std::fmt;

/// Errors surfaced by the queue and task stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The queue backend could not be reached or returned an error.
    QueueUnavailable { message: String },
    /// A message payload failed schema validation. Poison; never retried.
    InvalidPayload { msg_id: i64, reason: String },
    /// The task referenced by a message does not exist.
    TaskNotFound { task_id: String },
    /// The worker referenced by a task does not exist.
    WorkerNotFound { worker_id: String },
    /// The task store rejected a write.
    TaskWriteFailed { message: String },
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueUnavailable { message } => write!(f, "queue unavailable: {message}"),
            Self::InvalidPayload { msg_id, reason } => {
                write!(f, "invalid payload in message {msg_id}: {reason}")
            }
            Self::TaskNotFound { task_id } => write!(f, "task not found: {task_id}"),
            Self::WorkerNotFound { worker_id } => write!(f, "worker not found: {worker_id}"),
            Self::TaskWriteFailed { message } => write!(f, "task write failed: {message}"),
        }
    }
}

impl std::error::Error for QueueError {}
