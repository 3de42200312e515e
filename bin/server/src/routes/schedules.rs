//! Schedule lookup and explicit re-reconciliation.

use super::parse_worker_id;
use crate::error::{ApiError, ok};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use chrono::Utc;
use nusoma_scheduler::{ScheduleChange, ScheduleStatus, plan_schedule_change};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleQuery {
    pub worker_id: String,
    /// `mode=status` returns the trimmed status view.
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    pub worker_id: String,
}

/// Returns a worker's schedule, or `data: null` when it has none.
pub async fn get_schedule(
    State(state): State<AppState>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<JsonValue>, ApiError> {
    let worker_id = parse_worker_id(&query.worker_id)?;
    let schedule = state.schedules.find_for_worker(worker_id).await?;

    if query.mode.as_deref() == Some("status") {
        let status = schedule.map(|schedule| {
            json!({
                "nextRunAt": schedule.next_run_at,
                "status": schedule.status,
                "isDisabled": schedule.status == ScheduleStatus::Disabled,
                "failedCount": schedule.failed_count,
            })
        });
        return Ok(ok(status));
    }
    Ok(ok(schedule))
}

/// Re-runs schedule reconciliation from the currently saved graph.
pub async fn reconcile_schedule(
    State(state): State<AppState>,
    Json(request): Json<ReconcileRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    let worker_id = parse_worker_id(&request.worker_id)?;
    let graph = state.graphs.load_graph(worker_id).await?;

    let now = Utc::now();
    let change = plan_schedule_change(
        worker_id,
        graph.as_ref().and_then(|graph| graph.starter_block()),
        now,
    )?;
    state.schedules.apply_change(worker_id, &change, now).await?;

    match change {
        ScheduleChange::Upsert(schedule) => Ok(ok(json!({
            "action": "upserted",
            "schedule": schedule,
        }))),
        ScheduleChange::Remove => Ok(ok(json!({ "action": "removed" }))),
    }
}
