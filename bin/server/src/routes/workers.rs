//! Worker CRUD, graph saves, deployment status, and deploys.

use super::{parse_user_id, parse_worker_id};
use crate::db::WorkerRecord;
use crate::error::{ApiError, ok};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use nusoma_core::WorkerId;
use nusoma_graph::{WorkerGraph, state_hash};
use nusoma_scheduler::{ScheduleChange, plan_schedule_change};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkerRequest {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkerRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub variables: Option<JsonValue>,
    /// When present, replaces the worker's stored graph.
    #[serde(default)]
    pub graph: Option<WorkerGraph>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListWorkersQuery {
    pub user_id: String,
}

pub async fn create_worker(
    State(state): State<AppState>,
    Json(request): Json<CreateWorkerRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::Validation {
            message: "worker name must not be empty".to_string(),
        });
    }

    let now = Utc::now();
    let record = WorkerRecord {
        id: WorkerId::new(),
        user_id: parse_user_id(&request.user_id)?,
        name: request.name,
        color: request.color.unwrap_or_else(|| "#3972F6".to_string()),
        variables: json!({}),
        is_deployed: false,
        deployed_at: None,
        deployed_state_hash: None,
        last_synced: None,
        created_at: now,
        updated_at: now,
    };
    state.workers.create(&record).await?;
    tracing::info!(worker_id = %record.id, "worker created");
    Ok(ok(record))
}

pub async fn list_workers(
    State(state): State<AppState>,
    Query(query): Query<ListWorkersQuery>,
) -> Result<Json<JsonValue>, ApiError> {
    let user_id = parse_user_id(&query.user_id)?;
    let workers = state.workers.list_for_user(user_id).await?;
    Ok(ok(workers))
}

pub async fn get_worker(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    let worker_id = parse_worker_id(&id)?;
    let worker = find_worker(&state, worker_id).await?;
    let graph = state.graphs.load_graph(worker_id).await?;
    Ok(ok(json!({ "worker": worker, "graph": graph })))
}

/// Updates worker metadata and, when a graph is supplied, replaces the
/// stored graph and reconciles the schedule row against its starter
/// block.
pub async fn update_worker(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateWorkerRequest>,
) -> Result<Json<JsonValue>, ApiError> {
    let worker_id = parse_worker_id(&id)?;
    find_worker(&state, worker_id).await?;

    let now = Utc::now();
    state
        .workers
        .update_meta(
            worker_id,
            request.name.as_deref(),
            request.color.as_deref(),
            request.variables.as_ref(),
            now,
        )
        .await?;

    let mut schedule_updated = false;
    if let Some(mut graph) = request.graph {
        graph.rebuild_index_map();
        graph.validate()?;
        state.graphs.save_graph(worker_id, &graph, now).await?;

        let change = plan_schedule_change(worker_id, graph.starter_block(), now)?;
        state.schedules.apply_change(worker_id, &change, now).await?;
        schedule_updated = matches!(change, ScheduleChange::Upsert(_));
        tracing::info!(
            %worker_id,
            blocks = graph.block_count(),
            schedule_updated,
            "worker graph saved"
        );
    }

    let worker = find_worker(&state, worker_id).await?;
    Ok(ok(json!({
        "worker": worker,
        "scheduleUpdated": schedule_updated,
    })))
}

pub async fn delete_worker(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    let worker_id = parse_worker_id(&id)?;
    if !state.workers.delete(worker_id).await? {
        return Err(ApiError::NotFound {
            resource: "worker",
            id,
        });
    }
    tracing::info!(%worker_id, "worker deleted");
    Ok(ok(json!({ "deleted": true })))
}

/// Compares the live graph hash against the hash pinned at the last
/// deploy. This is the single definition of "needs redeployment"; the
/// shared registry is refreshed with the verdict.
pub async fn worker_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    let worker_id = parse_worker_id(&id)?;
    let worker = find_worker(&state, worker_id).await?;

    let graph = state.graphs.load_graph(worker_id).await?;
    let live_hash = graph.as_ref().map(state_hash);
    let needs_redeployment = worker.is_deployed
        && live_hash.as_deref() != worker.deployed_state_hash.as_deref();
    state.registry.set(worker_id, needs_redeployment);

    Ok(ok(json!({
        "isDeployed": worker.is_deployed,
        "deployedAt": worker.deployed_at,
        "needsRedeployment": needs_redeployment,
        "stateHash": live_hash,
    })))
}

/// Pins the current graph hash as deployed and clears the
/// needs-redeployment verdict.
pub async fn deploy_worker(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    let worker_id = parse_worker_id(&id)?;
    find_worker(&state, worker_id).await?;

    let graph = state
        .graphs
        .load_graph(worker_id)
        .await?
        .ok_or(ApiError::Validation {
            message: "worker has no graph to deploy".to_string(),
        })?;

    let hash = state_hash(&graph);
    let now = Utc::now();
    state.workers.mark_deployed(worker_id, &hash, now).await?;
    state.registry.set(worker_id, false);
    tracing::info!(%worker_id, state_hash = hash, "worker deployed");

    let worker = find_worker(&state, worker_id).await?;
    Ok(ok(worker))
}

async fn find_worker(state: &AppState, worker_id: WorkerId) -> Result<WorkerRecord, ApiError> {
    state
        .workers
        .find(worker_id)
        .await?
        .ok_or(ApiError::NotFound {
            resource: "worker",
            id: worker_id.to_string(),
        })
}
