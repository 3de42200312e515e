//! Task creation and on-demand queue draining.

use super::{parse_user_id, parse_worker_id};
use crate::error::{ApiError, ok};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use chrono::Utc;
use nusoma_core::TaskId;
use nusoma_queue::{Task, TaskQueue, TaskStatus};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub user_id: String,
    pub worker_id: String,
    pub description: String,
}

/// Creates a pending task and enqueues its message.
pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    if request.description.trim().is_empty() {
        return Err(ApiError::Validation {
            message: "task description must not be empty".to_string(),
        });
    }
    let user_id = parse_user_id(&request.user_id)?;
    let worker_id = parse_worker_id(&request.worker_id)?;
    if state.workers.find(worker_id).await?.is_none() {
        return Err(ApiError::NotFound {
            resource: "worker",
            id: request.worker_id,
        });
    }

    let now = Utc::now();
    let task = Task {
        id: TaskId::new(),
        user_id,
        worker_id,
        description: request.description,
        status: TaskStatus::Pending,
        result: None,
        created_at: now,
        updated_at: now,
    };
    state.tasks.create(&task).await?;
    let msg_id = state
        .queue
        .send(json!({ "taskId": task.id, "userId": task.user_id }))
        .await?;
    tracing::info!(task_id = %task.id, msg_id, "task enqueued");

    Ok(ok(task))
}

/// Drains one batch from the task queue.
pub async fn process_tasks(State(state): State<AppState>) -> Result<Json<JsonValue>, ApiError> {
    let summary = state.consumer.drain().await?;
    Ok(ok(json!({
        "received": summary.received,
        "completed": summary.completed,
        "failed": summary.failed,
        "poisoned": summary.poisoned,
    })))
}
