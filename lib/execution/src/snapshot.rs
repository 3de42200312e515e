//! Content-addressed snapshots of a worker's graph at execution time.

use chrono::{DateTime, Utc};
use nusoma_core::{SnapshotId, WorkerId};
use nusoma_graph::WorkerGraph;
use serde::{Deserialize, Serialize};

/// An immutable copy of a worker's normalized graph, keyed by the
/// deterministic state hash. Two executions of byte-identical graph
/// content share one snapshot row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerExecutionSnapshot {
    pub id: SnapshotId,
    pub worker_id: WorkerId,
    /// Hex SHA-256 of the canonical graph form (cosmetic fields excluded).
    pub state_hash: String,
    /// The full serialized graph as it was at execution time.
    pub state_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl WorkerExecutionSnapshot {
    /// Captures a new snapshot of the given graph.
    ///
    /// Callers should first look up an existing snapshot with the same
    /// `(worker_id, state_hash)` and reuse it; this constructor is only
    /// for the miss path.
    #[must_use]
    pub fn capture(worker_id: WorkerId, graph: &WorkerGraph, now: DateTime<Utc>) -> Self {
        Self {
            id: SnapshotId::new(),
            worker_id,
            state_hash: nusoma_graph::state_hash(graph),
            state_data: serde_json::to_value(graph).unwrap_or(serde_json::Value::Null),
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use nusoma_graph::Block;

    #[test]
    fn capture_records_hash_and_data() {
        let mut graph = WorkerGraph::new();
        graph
            .add_block(Block::new("start", "starter", "Start"))
            .unwrap();

        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let snapshot = WorkerExecutionSnapshot::capture(WorkerId::new(), &graph, now);

        assert_eq!(snapshot.state_hash, nusoma_graph::state_hash(&graph));
        assert!(snapshot.state_data["graph"].get("blocks").is_some());
        assert_eq!(snapshot.created_at, now);
    }
}
