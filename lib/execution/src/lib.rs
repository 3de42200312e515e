//! Execution logging and cost accounting for nusoma workers.
//!
//! Every worker execution produces:
//!
//! - A content-addressed, immutable **snapshot** of the graph that ran
//!   (identical graph content reuses the existing snapshot)
//! - One **execution log** per execution id, referencing the snapshot
//! - One **block log** per block the executor ran, with timing, status,
//!   truncated payloads, and an optional cost breakdown
//! - A tree of **trace spans** for visualization
//!
//! Aggregate totals (counts, cost, tokens) are computed exactly once at
//! completion from the full block-log set — never incrementally mutated —
//! so concurrent block writes inside a parallel subflow cannot race.

pub mod error;
pub mod log;
pub mod logger;
pub mod snapshot;
pub mod trace;

pub use error::StorageError;
pub use log::{
    BlockExecutionLog, BlockStatus, CostBreakdown, ExecutionTotals, TokenUsage, TriggerSource,
    WorkerExecutionLog, truncate_payload,
};
pub use logger::{ExecutionLogStore, ExecutionLogger, InMemoryLogStore, InMemorySnapshotStore,
    SnapshotStore};
pub use snapshot::WorkerExecutionSnapshot;
pub use trace::TraceSpan;
