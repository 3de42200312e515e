//! HTTP routes. Every response uses the `{success, data|error}`
//! envelope.

mod schedules;
mod tasks;
mod workers;

use crate::error::ApiError;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use nusoma_core::{UserId, WorkerId};
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/workers",
            get(workers::list_workers).post(workers::create_worker),
        )
        .route(
            "/api/workers/{id}",
            get(workers::get_worker)
                .put(workers::update_worker)
                .delete(workers::delete_worker),
        )
        .route("/api/workers/{id}/status", get(workers::worker_status))
        .route("/api/workers/{id}/deploy", post(workers::deploy_worker))
        .route(
            "/api/schedules",
            get(schedules::get_schedule).post(schedules::reconcile_schedule),
        )
        .route("/api/tasks", post(tasks::create_task))
        .route("/api/tasks/process", get(tasks::process_tasks))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn parse_worker_id(raw: &str) -> Result<WorkerId, ApiError> {
    raw.parse().map_err(|_| ApiError::Validation {
        message: format!("invalid worker id {raw:?}"),
    })
}

fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse().map_err(|_| ApiError::Validation {
        message: format!("invalid user id {raw:?}"),
    })
}
