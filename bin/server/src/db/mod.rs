//! Postgres persistence: repositories and trait implementations over
//! the shared connection pool.

mod execution;
mod graph;
mod queue;
mod schedule;
mod task;
mod worker;

pub use execution::{PgExecutionLogStore, PgSnapshotStore};
pub use graph::GraphStore;
pub use queue::PgmqQueue;
pub use schedule::ScheduleRepository;
pub use task::PgTaskStore;
pub use worker::{WorkerRecord, WorkerRepository};

/// Wraps an id parse failure as a column decode error, keeping the
/// repository signatures on `sqlx::Error`.
fn decode_error(err: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}
