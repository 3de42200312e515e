//! Queue messages and the task payload schema.

use crate::error::QueueError;
use nusoma_core::{TaskId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A raw message as read from the queue.
///
/// `msg_id` is the queue's own identifier and is what [`delete`] takes;
/// the payload is opaque JSON until validated into a [`TaskPayload`].
///
/// [`delete`]: crate::queue::TaskQueue::delete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub msg_id: i64,
    pub payload: JsonValue,
    /// How many times this message has been read, including this read.
    pub read_count: i64,
}

/// The validated payload of a task message.
///
/// The schema is strict: both fields are required, unknown fields are
/// rejected. Anything that fails to parse is a poison message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskPayload {
    pub task_id: TaskId,
    pub user_id: UserId,
}

impl TaskPayload {
    /// Validates a raw message payload.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidPayload`] when the payload does not
    /// match the schema; the caller must treat the message as poison.
    pub fn from_message(message: &QueueMessage) -> Result<Self, QueueError> {
        serde_json::from_value(message.payload.clone()).map_err(|err| {
            QueueError::InvalidPayload {
                msg_id: message.msg_id,
                reason: err.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(payload: JsonValue) -> QueueMessage {
        QueueMessage {
            msg_id: 1,
            payload,
            read_count: 1,
        }
    }

    #[test]
    fn valid_payload_parses() {
        let task_id = TaskId::new();
        let user_id = UserId::new();
        let parsed = TaskPayload::from_message(&message(json!({
            "taskId": task_id.to_string(),
            "userId": user_id.to_string(),
        })))
        .unwrap();
        assert_eq!(parsed.task_id, task_id);
        assert_eq!(parsed.user_id, user_id);
    }

    #[test]
    fn missing_field_is_rejected() {
        let result = TaskPayload::from_message(&message(json!({
            "taskId": TaskId::new().to_string(),
        })));
        assert!(matches!(result, Err(QueueError::InvalidPayload { .. })));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let result = TaskPayload::from_message(&message(json!({
            "taskId": TaskId::new().to_string(),
            "userId": UserId::new().to_string(),
            "extra": true,
        })));
        assert!(matches!(result, Err(QueueError::InvalidPayload { .. })));
    }

    #[test]
    fn wrong_id_prefix_is_rejected() {
        let result = TaskPayload::from_message(&message(json!({
            "taskId": UserId::new().to_string(),
            "userId": UserId::new().to_string(),
        })));
        assert!(matches!(result, Err(QueueError::InvalidPayload { .. })));
    }
}
