//! pgmq-backed task queue.
//!
//! Visibility timeouts, redelivery, and read counts all come from the
//! pgmq extension; this wrapper only shapes the SQL calls.

use async_trait::async_trait;
use nusoma_queue::{QueueError, QueueMessage, TaskQueue};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool, Row};
use std::time::Duration;

fn unavailable(err: impl std::fmt::Display) -> QueueError {
    QueueError::QueueUnavailable {
        message: err.to_string(),
    }
}

#[derive(FromRow)]
struct MessageRow {
    msg_id: i64,
    read_ct: i32,
    message: JsonValue,
}

/// The durable task queue, one pgmq queue per deployment.
#[derive(Clone)]
pub struct PgmqQueue {
    pool: PgPool,
    queue_name: String,
}

impl PgmqQueue {
    #[must_use]
    pub fn new(pool: PgPool, queue_name: impl Into<String>) -> Self {
        Self {
            pool,
            queue_name: queue_name.into(),
        }
    }
}

#[async_trait]
impl TaskQueue for PgmqQueue {
    async fn send(&self, payload: JsonValue) -> Result<i64, QueueError> {
        let row = sqlx::query("SELECT pgmq.send($1, $2) AS msg_id")
            .bind(&self.queue_name)
            .bind(&payload)
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;
        row.try_get("msg_id").map_err(unavailable)
    }

    async fn read(
        &self,
        visibility_timeout: Duration,
        batch_size: usize,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let rows: Vec<MessageRow> =
            sqlx::query_as("SELECT msg_id, read_ct, message FROM pgmq.read($1, $2, $3)")
                .bind(&self.queue_name)
                .bind(visibility_timeout.as_secs() as i32)
                .bind(batch_size as i32)
                .fetch_all(&self.pool)
                .await
                .map_err(unavailable)?;

        Ok(rows
            .into_iter()
            .map(|row| QueueMessage {
                msg_id: row.msg_id,
                payload: row.message,
                read_count: i64::from(row.read_ct),
            })
            .collect())
    }

    async fn delete(&self, msg_id: i64) -> Result<bool, QueueError> {
        let row = sqlx::query("SELECT pgmq.delete($1, $2) AS deleted")
            .bind(&self.queue_name)
            .bind(msg_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;
        row.try_get("deleted").map_err(unavailable)
    }
}
