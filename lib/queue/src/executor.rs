//! The external executor and worker-lookup seams.

use crate::error::QueueError;
use async_trait::async_trait;
use nusoma_core::{TaskId, WorkerId};
use nusoma_execution::{BlockExecutionLog, ExecutionTotals};
use nusoma_graph::WorkerGraph;
use serde_json::Value as JsonValue;

/// The result of running a worker once.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub success: bool,
    /// Final output of the run, derived from the last block's output.
    pub output: JsonValue,
    /// Per-block logs; their costs feed the task's cost aggregate.
    pub logs: Vec<BlockExecutionLog>,
    /// Business error when `success` is false.
    pub error: Option<String>,
}

impl ExecutionOutcome {
    /// Aggregates cost and token totals from the block logs.
    #[must_use]
    pub fn totals(&self) -> ExecutionTotals {
        ExecutionTotals::from_blocks(&self.logs)
    }
}

/// Runs a worker's graph. The production implementation calls the
/// external execution engine over HTTP.
#[async_trait]
pub trait WorkerExecutor: Send + Sync {
    async fn execute(
        &self,
        worker_id: WorkerId,
        graph: &WorkerGraph,
        request_id: &str,
        input: &JsonValue,
        task_id: TaskId,
    ) -> Result<ExecutionOutcome, QueueError>;
}

/// Resolves a worker id to its current graph.
#[async_trait]
pub trait WorkerProvider: Send + Sync {
    async fn worker_graph(&self, worker_id: WorkerId) -> Result<Option<WorkerGraph>, QueueError>;
}
