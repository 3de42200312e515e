//! Worker execution over HTTP, wrapped in the logging pipeline.
//!
//! [`HttpWorkerExecutor`] talks to the external execution engine.
//! [`LoggingExecutor`] wraps it with the snapshot/log lifecycle so every
//! queue-triggered run leaves a full execution record behind.

use crate::db::{GraphStore, PgExecutionLogStore, PgSnapshotStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nusoma_core::{ExecutionId, TaskId, WorkerId};
use nusoma_execution::{
    BlockExecutionLog, BlockStatus, CostBreakdown, ExecutionLogger, TraceSpan, TriggerSource,
};
use nusoma_graph::WorkerGraph;
use nusoma_queue::{ExecutionOutcome, QueueError, WorkerExecutor, WorkerProvider};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

fn engine_unreachable(err: impl std::fmt::Display) -> QueueError {
    QueueError::QueueUnavailable {
        message: format!("execution engine: {err}"),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteResponse {
    success: bool,
    #[serde(default)]
    output: JsonValue,
    #[serde(default)]
    logs: Vec<EngineBlockLog>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EngineBlockLog {
    block_id: String,
    block_type: String,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    status: String,
    #[serde(default)]
    input: JsonValue,
    #[serde(default)]
    output: JsonValue,
    #[serde(default)]
    cost: Option<CostBreakdown>,
}

impl EngineBlockLog {
    fn into_log(self, execution_id: ExecutionId) -> BlockExecutionLog {
        let status = self.status.parse().unwrap_or_else(|()| {
            tracing::warn!(status = %self.status, "unknown block status from engine");
            BlockStatus::Error
        });
        let log = BlockExecutionLog::new(
            execution_id,
            self.block_id,
            self.block_type,
            self.started_at,
            self.ended_at,
            status,
            &self.input,
            &self.output,
        );
        match self.cost {
            Some(cost) => log.with_cost(cost),
            None => log,
        }
    }
}

/// Calls the external execution engine's `/execute` endpoint.
pub struct HttpWorkerExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWorkerExecutor {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Runs the graph once, producing block logs under `execution_id`.
    ///
    /// # Errors
    ///
    /// Transport failures and non-2xx engine responses come back as
    /// `QueueUnavailable`, which the consumer leaves for redelivery.
    /// A run the engine reports as failed is a successful call with
    /// `success: false` in the outcome.
    pub async fn run(
        &self,
        graph: &WorkerGraph,
        request_id: &str,
        input: &JsonValue,
        task_id: TaskId,
        execution_id: ExecutionId,
    ) -> Result<ExecutionOutcome, QueueError> {
        let body = json!({
            "workflow": graph,
            "requestId": request_id,
            "input": input,
            "taskId": task_id,
        });

        let response = self
            .client
            .post(format!("{}/execute", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(engine_unreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(engine_unreachable(format!("returned {status}")));
        }

        let payload: ExecuteResponse = response.json().await.map_err(engine_unreachable)?;
        let logs = payload
            .logs
            .into_iter()
            .map(|log| log.into_log(execution_id))
            .collect();

        Ok(ExecutionOutcome {
            success: payload.success,
            output: payload.output,
            logs,
            error: payload.error,
        })
    }
}

/// Builds the trace tree stored with the finished execution.
fn trace_from_logs(
    logs: &[BlockExecutionLog],
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    success: bool,
) -> TraceSpan {
    let mut root = TraceSpan::new(
        "workflow",
        "workflow",
        started_at,
        ended_at,
        if success { "success" } else { "error" },
    );
    for log in logs {
        root = root.with_child(
            TraceSpan::new(
                log.block_type.clone(),
                "block",
                log.started_at,
                log.ended_at,
                log.status.as_str(),
            )
            .for_block(log.block_id.clone()),
        );
    }
    root
}

/// Runs a worker through the engine and records the full execution:
/// snapshot resolution, the execution row, every block log, and the
/// closing totals.
pub struct LoggingExecutor {
    inner: HttpWorkerExecutor,
    logger: ExecutionLogger<PgSnapshotStore, PgExecutionLogStore>,
}

impl LoggingExecutor {
    #[must_use]
    pub fn new(
        inner: HttpWorkerExecutor,
        logger: ExecutionLogger<PgSnapshotStore, PgExecutionLogStore>,
    ) -> Self {
        Self { inner, logger }
    }
}

#[async_trait]
impl WorkerExecutor for LoggingExecutor {
    async fn execute(
        &self,
        worker_id: WorkerId,
        graph: &WorkerGraph,
        request_id: &str,
        input: &JsonValue,
        task_id: TaskId,
    ) -> Result<ExecutionOutcome, QueueError> {
        let execution_id = ExecutionId::new();
        let started_at = Utc::now();

        // The execution record is primary: without it there is nothing
        // to attach block logs to, so its failure aborts the run.
        self.logger
            .begin(worker_id, execution_id, graph, TriggerSource::Queue, started_at)
            .await
            .map_err(|err| QueueError::QueueUnavailable {
                message: format!("execution log: {err}"),
            })?;

        let outcome = self
            .inner
            .run(graph, request_id, input, task_id, execution_id)
            .await?;

        for log in &outcome.logs {
            self.logger
                .log_block(log.clone())
                .await
                .map_err(|err| QueueError::QueueUnavailable {
                    message: format!("block log: {err}"),
                })?;
        }

        let ended_at = Utc::now();
        let trace = trace_from_logs(&outcome.logs, started_at, ended_at, outcome.success);
        self.logger
            .finish(execution_id, ended_at, Some(trace), outcome.error.clone())
            .await
            .map_err(|err| QueueError::QueueUnavailable {
                message: format!("execution log: {err}"),
            })?;

        Ok(outcome)
    }
}

/// Resolves worker graphs from the normalized tables.
pub struct GraphWorkerProvider {
    graphs: GraphStore,
}

impl GraphWorkerProvider {
    #[must_use]
    pub fn new(graphs: GraphStore) -> Self {
        Self { graphs }
    }
}

#[async_trait]
impl WorkerProvider for GraphWorkerProvider {
    async fn worker_graph(&self, worker_id: WorkerId) -> Result<Option<WorkerGraph>, QueueError> {
        self.graphs
            .load_graph(worker_id)
            .await
            .map_err(|err| QueueError::QueueUnavailable {
                message: format!("graph load: {err}"),
            })
    }
}
