//! Task rows, activity records, and their storage seam.

use crate::error::QueueError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nusoma_core::{TaskId, UserId, WorkerId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Mutex;

/// Lifecycle of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    WorkComplete,
    Error,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::WorkComplete => "WORK_COMPLETE",
            Self::Error => "ERROR",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "WORK_COMPLETE" => Ok(Self::WorkComplete),
            "ERROR" => Ok(Self::Error),
            _ => Err(()),
        }
    }
}

/// One unit of queued work: run a worker once on behalf of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub worker_id: WorkerId,
    /// What the user asked for, fed into the worker as input.
    pub description: String,
    pub status: TaskStatus,
    /// Human-readable report plus `totalCost`, set at completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Category of a task activity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Started,
    Completed,
    Failed,
}

impl ActivityKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// An append-only audit entry for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub task_id: TaskId,
    pub kind: ActivityKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence for tasks and their activity trail.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get(&self, task_id: TaskId) -> Result<Option<Task>, QueueError>;

    /// Updates status (and optionally the result) in one write.
    async fn update(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        result: Option<JsonValue>,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError>;

    async fn record_activity(&self, record: ActivityRecord) -> Result<(), QueueError>;
}

/// In-memory task store for tests and local development.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
    activity: Mutex<Vec<ActivityRecord>>,
}

impl InMemoryTaskStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: Task) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.insert(task.id, task);
        }
    }

    /// All activity recorded for a task, in insertion order.
    #[must_use]
    pub fn activity_for(&self, task_id: TaskId) -> Vec<ActivityRecord> {
        self.activity
            .lock()
            .map(|records| {
                records
                    .iter()
                    .filter(|record| record.task_id == task_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get(&self, task_id: TaskId) -> Result<Option<Task>, QueueError> {
        let tasks = self.tasks.lock().map_err(|_| QueueError::TaskWriteFailed {
            message: "task store poisoned".to_string(),
        })?;
        Ok(tasks.get(&task_id).cloned())
    }

    async fn update(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        result: Option<JsonValue>,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let mut tasks = self.tasks.lock().map_err(|_| QueueError::TaskWriteFailed {
            message: "task store poisoned".to_string(),
        })?;
        let task = tasks.get_mut(&task_id).ok_or(QueueError::TaskNotFound {
            task_id: task_id.to_string(),
        })?;
        task.status = status;
        if result.is_some() {
            task.result = result;
        }
        task.updated_at = now;
        Ok(())
    }

    async fn record_activity(&self, record: ActivityRecord) -> Result<(), QueueError> {
        let mut records = self
            .activity
            .lock()
            .map_err(|_| QueueError::TaskWriteFailed {
                message: "task store poisoned".to_string(),
            })?;
        records.push(record);
        Ok(())
    }
}
