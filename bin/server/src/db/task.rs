//! Postgres-backed task store for the queue consumer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nusoma_core::TaskId;
use nusoma_queue::{ActivityRecord, QueueError, Task, TaskStatus, TaskStore};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};

fn write_failed(err: impl std::fmt::Display) -> QueueError {
    QueueError::TaskWriteFailed {
        message: err.to_string(),
    }
}

#[derive(FromRow)]
struct TaskRow {
    id: String,
    user_id: String,
    worker_id: String,
    description: String,
    status: String,
    result: Option<JsonValue>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskRow {
    fn try_into_record(self) -> Result<Task, QueueError> {
        let status: TaskStatus = self
            .status
            .parse()
            .map_err(|()| write_failed(format!("unknown task status {:?}", self.status)))?;
        Ok(Task {
            id: self.id.parse().map_err(write_failed)?,
            user_id: self.user_id.parse().map_err(write_failed)?,
            worker_id: self.worker_id.parse().map_err(write_failed)?,
            description: self.description,
            status,
            result: self.result,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Tasks and their activity trail in Postgres.
#[derive(Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a fresh pending task.
    pub async fn create(&self, task: &Task) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            INSERT INTO tasks
                (id, user_id, worker_id, description, status, result, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(task.id.to_string())
        .bind(task.user_id.to_string())
        .bind(task.worker_id.to_string())
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(&task.result)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(write_failed)?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn get(&self, task_id: TaskId) -> Result<Option<Task>, QueueError> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(task_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(write_failed)?;
        row.map(TaskRow::try_into_record).transpose()
    }

    async fn update(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        result: Option<JsonValue>,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let updated = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2,
                result = COALESCE($3, result),
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(task_id.to_string())
        .bind(status.as_str())
        .bind(result)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(write_failed)?;

        if updated.rows_affected() == 0 {
            return Err(QueueError::TaskNotFound {
                task_id: task_id.to_string(),
            });
        }
        Ok(())
    }

    async fn record_activity(&self, record: ActivityRecord) -> Result<(), QueueError> {
        sqlx::query(
            "INSERT INTO task_activity (task_id, kind, message, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(record.task_id.to_string())
        .bind(record.kind.as_str())
        .bind(&record.message)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_failed)?;
        Ok(())
    }
}
