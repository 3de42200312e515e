//! The execution logging pipeline and its storage seams.
//!
//! [`ExecutionLogger`] drives the snapshot/log lifecycle; the two store
//! traits are the persistence seams the server implements over Postgres
//! and tests implement in memory.

use crate::error::StorageError;
use crate::log::{
    BlockExecutionLog, ExecutionTotals, TriggerSource, WorkerExecutionLog,
};
use crate::snapshot::WorkerExecutionSnapshot;
use crate::trace::TraceSpan;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nusoma_core::{ExecutionId, WorkerId};
use nusoma_graph::WorkerGraph;
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::Mutex;

/// Persistence for content-addressed graph snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Looks up an existing snapshot by `(worker_id, state_hash)`.
    async fn find_by_hash(
        &self,
        worker_id: WorkerId,
        state_hash: &str,
    ) -> Result<Option<WorkerExecutionSnapshot>, StorageError>;

    /// Inserts a new snapshot row.
    async fn insert(&self, snapshot: &WorkerExecutionSnapshot) -> Result<(), StorageError>;
}

/// Persistence for execution and block logs.
#[async_trait]
pub trait ExecutionLogStore: Send + Sync {
    async fn insert_execution(&self, log: &WorkerExecutionLog) -> Result<(), StorageError>;

    /// Appends one block log. Block writes are independent rows, so
    /// parallel branches can append concurrently without coordination.
    async fn append_block(&self, log: &BlockExecutionLog) -> Result<(), StorageError>;

    /// Returns every block log recorded for the execution.
    async fn blocks_for(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Vec<BlockExecutionLog>, StorageError>;

    /// Closes out the execution row with final totals and metadata,
    /// returning the updated record.
    async fn finish_execution(
        &self,
        execution_id: ExecutionId,
        ended_at: DateTime<Utc>,
        totals: ExecutionTotals,
        metadata: JsonValue,
    ) -> Result<WorkerExecutionLog, StorageError>;
}

/// Orchestrates the logging lifecycle for one or more executions.
pub struct ExecutionLogger<S, L> {
    snapshots: S,
    logs: L,
}

impl<S, L> ExecutionLogger<S, L>
where
    S: SnapshotStore,
    L: ExecutionLogStore,
{
    pub fn new(snapshots: S, logs: L) -> Self {
        Self { snapshots, logs }
    }

    pub fn snapshots(&self) -> &S {
        &self.snapshots
    }

    pub fn logs(&self) -> &L {
        &self.logs
    }

    /// Starts logging an execution.
    ///
    /// Resolves the graph's snapshot content-addressed: an existing
    /// snapshot with the same `(worker_id, state_hash)` is reused, a new
    /// one is created otherwise. Then inserts the execution row in the
    /// running state.
    ///
    /// # Errors
    ///
    /// Propagates snapshot and execution-row write failures. These are
    /// primary-record failures; callers must not proceed without them.
    pub async fn begin(
        &self,
        worker_id: WorkerId,
        execution_id: ExecutionId,
        graph: &WorkerGraph,
        trigger: TriggerSource,
        now: DateTime<Utc>,
    ) -> Result<WorkerExecutionLog, StorageError> {
        let state_hash = nusoma_graph::state_hash(graph);

        let snapshot = match self.snapshots.find_by_hash(worker_id, &state_hash).await? {
            Some(existing) => {
                tracing::debug!(%worker_id, state_hash, "reusing execution snapshot");
                existing
            }
            None => {
                let snapshot = WorkerExecutionSnapshot::capture(worker_id, graph, now);
                self.snapshots.insert(&snapshot).await?;
                snapshot
            }
        };

        let log = WorkerExecutionLog {
            id: ulid::Ulid::new().to_string(),
            worker_id,
            execution_id,
            state_snapshot_id: snapshot.id,
            trigger,
            started_at: now,
            ended_at: None,
            duration_ms: None,
            totals: ExecutionTotals::default(),
            metadata: JsonValue::Null,
        };
        self.logs.insert_execution(&log).await?;
        Ok(log)
    }

    /// Records one block's run.
    ///
    /// # Errors
    ///
    /// Propagates the block-row write failure.
    pub async fn log_block(&self, block: BlockExecutionLog) -> Result<(), StorageError> {
        self.logs.append_block(&block).await
    }

    /// Completes an execution: recomputes totals from the full block-log
    /// set, attaches the trace tree, and closes out the row.
    ///
    /// # Errors
    ///
    /// Fails if the block logs cannot be read or the execution row
    /// cannot be updated.
    pub async fn finish(
        &self,
        execution_id: ExecutionId,
        ended_at: DateTime<Utc>,
        trace: Option<TraceSpan>,
        error: Option<String>,
    ) -> Result<WorkerExecutionLog, StorageError> {
        let blocks = self.logs.blocks_for(execution_id).await?;
        let totals = ExecutionTotals::from_blocks(&blocks);

        let mut metadata = serde_json::Map::new();
        if let Some(trace) = trace {
            metadata.insert(
                "traceSpans".to_string(),
                serde_json::to_value(trace).unwrap_or(JsonValue::Null),
            );
        }
        if let Some(error) = error {
            metadata.insert("error".to_string(), json!(error));
        }

        tracing::info!(
            %execution_id,
            block_count = totals.block_count,
            total_cost = totals.total_cost,
            "execution finished"
        );

        self.logs
            .finish_execution(execution_id, ended_at, totals, JsonValue::Object(metadata))
            .await
    }
}

/// In-memory snapshot store for tests and local development.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    rows: Mutex<Vec<WorkerExecutionSnapshot>>,
}

impl InMemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn find_by_hash(
        &self,
        worker_id: WorkerId,
        state_hash: &str,
    ) -> Result<Option<WorkerExecutionSnapshot>, StorageError> {
        let rows = self.rows.lock().map_err(|_| StorageError::ReadFailed {
            message: "snapshot store poisoned".to_string(),
        })?;
        Ok(rows
            .iter()
            .find(|row| row.worker_id == worker_id && row.state_hash == state_hash)
            .cloned())
    }

    async fn insert(&self, snapshot: &WorkerExecutionSnapshot) -> Result<(), StorageError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StorageError::SnapshotWriteFailed {
                message: "snapshot store poisoned".to_string(),
            })?;
        rows.push(snapshot.clone());
        Ok(())
    }
}

/// In-memory execution/block log store for tests and local development.
#[derive(Default)]
pub struct InMemoryLogStore {
    executions: Mutex<HashMap<ExecutionId, WorkerExecutionLog>>,
    blocks: Mutex<Vec<BlockExecutionLog>>,
}

impl InMemoryLogStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The execution row as currently stored, if any.
    #[must_use]
    pub fn execution(&self, execution_id: ExecutionId) -> Option<WorkerExecutionLog> {
        self.executions
            .lock()
            .ok()
            .and_then(|rows| rows.get(&execution_id).cloned())
    }
}

#[async_trait]
impl ExecutionLogStore for InMemoryLogStore {
    async fn insert_execution(&self, log: &WorkerExecutionLog) -> Result<(), StorageError> {
        let mut rows = self
            .executions
            .lock()
            .map_err(|_| StorageError::ExecutionWriteFailed {
                message: "log store poisoned".to_string(),
            })?;
        rows.insert(log.execution_id, log.clone());
        Ok(())
    }

    async fn append_block(&self, log: &BlockExecutionLog) -> Result<(), StorageError> {
        let mut rows = self
            .blocks
            .lock()
            .map_err(|_| StorageError::BlockLogWriteFailed {
                message: "log store poisoned".to_string(),
            })?;
        rows.push(log.clone());
        Ok(())
    }

    async fn blocks_for(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Vec<BlockExecutionLog>, StorageError> {
        let rows = self.blocks.lock().map_err(|_| StorageError::ReadFailed {
            message: "log store poisoned".to_string(),
        })?;
        Ok(rows
            .iter()
            .filter(|row| row.execution_id == execution_id)
            .cloned()
            .collect())
    }

    async fn finish_execution(
        &self,
        execution_id: ExecutionId,
        ended_at: DateTime<Utc>,
        totals: ExecutionTotals,
        metadata: JsonValue,
    ) -> Result<WorkerExecutionLog, StorageError> {
        let mut rows = self
            .executions
            .lock()
            .map_err(|_| StorageError::ExecutionWriteFailed {
                message: "log store poisoned".to_string(),
            })?;
        let row = rows
            .get_mut(&execution_id)
            .ok_or(StorageError::ExecutionNotFound {
                execution_id: execution_id.to_string(),
            })?;
        row.ended_at = Some(ended_at);
        row.duration_ms = Some((ended_at - row.started_at).num_milliseconds().max(0));
        row.totals = totals;
        row.metadata = metadata;
        Ok(row.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{BlockStatus, CostBreakdown, TokenUsage};
    use chrono::TimeZone;
    use nusoma_graph::Block;

    fn logger() -> ExecutionLogger<InMemorySnapshotStore, InMemoryLogStore> {
        ExecutionLogger::new(InMemorySnapshotStore::new(), InMemoryLogStore::new())
    }

    fn graph_with_data(value: i64) -> WorkerGraph {
        let mut graph = WorkerGraph::new();
        let mut block = Block::new("start", "starter", "Start");
        block.data.insert("threshold".to_string(), json!(value));
        graph.add_block(block).unwrap();
        graph
    }

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap()
    }

    fn cost(total: f64, tokens: u64) -> CostBreakdown {
        CostBreakdown {
            input: total / 2.0,
            output: total / 2.0,
            total,
            tokens: TokenUsage::new(tokens / 2, tokens - tokens / 2),
            model: "gpt-4o".to_string(),
            pricing: None,
        }
    }

    #[tokio::test]
    async fn identical_graphs_reuse_one_snapshot() {
        let logger = logger();
        let worker_id = WorkerId::new();
        let graph = graph_with_data(5);

        let first = logger
            .begin(worker_id, ExecutionId::new(), &graph, TriggerSource::Manual, at(0))
            .await
            .unwrap();
        let second = logger
            .begin(worker_id, ExecutionId::new(), &graph, TriggerSource::Manual, at(1))
            .await
            .unwrap();

        assert_eq!(first.state_snapshot_id, second.state_snapshot_id);
        assert_eq!(logger.snapshots().len(), 1);
    }

    #[tokio::test]
    async fn changed_block_data_creates_new_snapshot() {
        let logger = logger();
        let worker_id = WorkerId::new();

        let first = logger
            .begin(
                worker_id,
                ExecutionId::new(),
                &graph_with_data(5),
                TriggerSource::Manual,
                at(0),
            )
            .await
            .unwrap();
        let second = logger
            .begin(
                worker_id,
                ExecutionId::new(),
                &graph_with_data(6),
                TriggerSource::Manual,
                at(1),
            )
            .await
            .unwrap();

        assert_ne!(first.state_snapshot_id, second.state_snapshot_id);
        assert_eq!(logger.snapshots().len(), 2);
    }

    #[tokio::test]
    async fn finish_recomputes_totals_from_block_logs() {
        let logger = logger();
        let execution_id = ExecutionId::new();
        logger
            .begin(
                WorkerId::new(),
                execution_id,
                &graph_with_data(1),
                TriggerSource::Queue,
                at(0),
            )
            .await
            .unwrap();

        logger
            .log_block(
                BlockExecutionLog::new(
                    execution_id,
                    "agent",
                    "agent",
                    at(0),
                    at(2),
                    BlockStatus::Success,
                    &json!({}),
                    &json!({"answer": 42}),
                )
                .with_cost(cost(0.01, 200)),
            )
            .await
            .unwrap();
        logger
            .log_block(BlockExecutionLog::new(
                execution_id,
                "notify",
                "api",
                at(2),
                at(3),
                BlockStatus::Error,
                &json!({}),
                &json!({"error": "timeout"}),
            ))
            .await
            .unwrap();

        let finished = logger
            .finish(
                execution_id,
                at(3),
                Some(TraceSpan::new("workflow", "workflow", at(0), at(3), "error")),
                Some("api block failed".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(finished.totals.block_count, 2);
        assert_eq!(finished.totals.success_count, 1);
        assert_eq!(finished.totals.error_count, 1);
        assert!((finished.totals.total_cost - 0.01).abs() < 1e-12);
        assert_eq!(finished.totals.total_tokens, 200);
        assert_eq!(finished.duration_ms, Some(3000));
        assert!(finished.metadata.get("traceSpans").is_some());
        assert_eq!(finished.metadata["error"], json!("api block failed"));
    }

    #[tokio::test]
    async fn total_cost_equals_sum_of_block_costs() {
        let logger = logger();
        let execution_id = ExecutionId::new();
        logger
            .begin(
                WorkerId::new(),
                execution_id,
                &graph_with_data(1),
                TriggerSource::Schedule,
                at(0),
            )
            .await
            .unwrap();

        let costs = [0.0042, 0.017, 0.0009];
        for (i, total) in costs.iter().enumerate() {
            logger
                .log_block(
                    BlockExecutionLog::new(
                        execution_id,
                        format!("blk-{i}"),
                        "agent",
                        at(i as u32),
                        at(i as u32 + 1),
                        BlockStatus::Success,
                        &json!({}),
                        &json!({}),
                    )
                    .with_cost(cost(*total, 100)),
                )
                .await
                .unwrap();
        }

        let finished = logger.finish(execution_id, at(5), None, None).await.unwrap();
        let expected: f64 = costs.iter().sum();
        assert!((finished.totals.total_cost - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn finishing_unknown_execution_errors() {
        let logs = InMemoryLogStore::new();
        let result = logs
            .finish_execution(
                ExecutionId::new(),
                at(0),
                ExecutionTotals::default(),
                JsonValue::Null,
            )
            .await;
        assert!(matches!(result, Err(StorageError::ExecutionNotFound { .. })));
    }
}
