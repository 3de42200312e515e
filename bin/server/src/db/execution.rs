//! Postgres-backed snapshot and execution-log stores.
//!
//! These implement the storage seams behind the execution logging
//! pipeline; sqlx failures are mapped onto the stable storage error
//! taxonomy so callers upstream never see driver errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nusoma_core::{ExecutionId, WorkerId};
use nusoma_execution::{
    BlockExecutionLog, BlockStatus, ExecutionLogStore, ExecutionTotals, SnapshotStore,
    StorageError, TriggerSource, WorkerExecutionLog, WorkerExecutionSnapshot,
};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};

fn read_failed(err: impl std::fmt::Display) -> StorageError {
    StorageError::ReadFailed {
        message: err.to_string(),
    }
}

#[derive(FromRow)]
struct SnapshotRow {
    id: String,
    worker_id: String,
    state_hash: String,
    state_data: JsonValue,
    created_at: DateTime<Utc>,
}

impl SnapshotRow {
    fn try_into_record(self) -> Result<WorkerExecutionSnapshot, StorageError> {
        Ok(WorkerExecutionSnapshot {
            id: self.id.parse().map_err(read_failed)?,
            worker_id: self.worker_id.parse().map_err(read_failed)?,
            state_hash: self.state_hash,
            state_data: self.state_data,
            created_at: self.created_at,
        })
    }
}

/// Content-addressed snapshot rows in `worker_execution_snapshot`.
#[derive(Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn find_by_hash(
        &self,
        worker_id: WorkerId,
        state_hash: &str,
    ) -> Result<Option<WorkerExecutionSnapshot>, StorageError> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            "SELECT * FROM worker_execution_snapshot WHERE worker_id = $1 AND state_hash = $2",
        )
        .bind(worker_id.to_string())
        .bind(state_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_failed)?;
        row.map(SnapshotRow::try_into_record).transpose()
    }

    async fn insert(&self, snapshot: &WorkerExecutionSnapshot) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO worker_execution_snapshot
                (id, worker_id, state_hash, state_data, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(snapshot.id.to_string())
        .bind(snapshot.worker_id.to_string())
        .bind(&snapshot.state_hash)
        .bind(&snapshot.state_data)
        .bind(snapshot.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::SnapshotWriteFailed {
            message: err.to_string(),
        })?;
        Ok(())
    }
}

#[derive(FromRow)]
struct ExecutionRow {
    id: String,
    worker_id: String,
    execution_id: String,
    state_snapshot_id: String,
    trigger: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
    block_count: i32,
    success_count: i32,
    error_count: i32,
    skipped_count: i32,
    total_cost: f64,
    total_tokens: i64,
    metadata: JsonValue,
}

impl ExecutionRow {
    fn try_into_record(self) -> Result<WorkerExecutionLog, StorageError> {
        let trigger: TriggerSource = self
            .trigger
            .parse()
            .map_err(|()| read_failed(format!("unknown trigger source {:?}", self.trigger)))?;
        Ok(WorkerExecutionLog {
            id: self.id,
            worker_id: self.worker_id.parse().map_err(read_failed)?,
            execution_id: self.execution_id.parse().map_err(read_failed)?,
            state_snapshot_id: self.state_snapshot_id.parse().map_err(read_failed)?,
            trigger,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_ms: self.duration_ms,
            totals: ExecutionTotals {
                block_count: self.block_count.max(0) as u32,
                success_count: self.success_count.max(0) as u32,
                error_count: self.error_count.max(0) as u32,
                skipped_count: self.skipped_count.max(0) as u32,
                total_cost: self.total_cost,
                total_tokens: self.total_tokens.max(0) as u64,
            },
            metadata: self.metadata,
        })
    }
}

#[derive(FromRow)]
struct BlockRow {
    id: String,
    execution_id: String,
    block_id: String,
    block_type: String,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    duration_ms: i64,
    status: String,
    input: JsonValue,
    output: JsonValue,
    cost: Option<JsonValue>,
    metadata: JsonValue,
}

impl BlockRow {
    fn try_into_record(self) -> Result<BlockExecutionLog, StorageError> {
        let status: BlockStatus = self
            .status
            .parse()
            .map_err(|()| read_failed(format!("unknown block status {:?}", self.status)))?;
        let cost = self
            .cost
            .map(serde_json::from_value)
            .transpose()
            .map_err(read_failed)?;
        Ok(BlockExecutionLog {
            id: self.id,
            execution_id: self.execution_id.parse().map_err(read_failed)?,
            block_id: self.block_id,
            block_type: self.block_type,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_ms: self.duration_ms,
            status,
            input: self.input,
            output: self.output,
            cost,
            metadata: self.metadata,
        })
    }
}

/// Execution and block log rows in Postgres.
#[derive(Clone)]
pub struct PgExecutionLogStore {
    pool: PgPool,
}

impl PgExecutionLogStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionLogStore for PgExecutionLogStore {
    async fn insert_execution(&self, log: &WorkerExecutionLog) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO worker_execution_log
                (id, worker_id, execution_id, state_snapshot_id, trigger,
                 started_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&log.id)
        .bind(log.worker_id.to_string())
        .bind(log.execution_id.to_string())
        .bind(log.state_snapshot_id.to_string())
        .bind(log.trigger.as_str())
        .bind(log.started_at)
        .bind(&log.metadata)
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::ExecutionWriteFailed {
            message: err.to_string(),
        })?;
        Ok(())
    }

    async fn append_block(&self, log: &BlockExecutionLog) -> Result<(), StorageError> {
        let cost = log
            .cost
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|err| StorageError::BlockLogWriteFailed {
                message: err.to_string(),
            })?;
        sqlx::query(
            r#"
            INSERT INTO block_execution_log
                (id, execution_id, block_id, block_type, started_at, ended_at,
                 duration_ms, status, input, output, cost, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&log.id)
        .bind(log.execution_id.to_string())
        .bind(&log.block_id)
        .bind(&log.block_type)
        .bind(log.started_at)
        .bind(log.ended_at)
        .bind(log.duration_ms)
        .bind(log.status.as_str())
        .bind(&log.input)
        .bind(&log.output)
        .bind(cost)
        .bind(&log.metadata)
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::BlockLogWriteFailed {
            message: err.to_string(),
        })?;
        Ok(())
    }

    async fn blocks_for(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Vec<BlockExecutionLog>, StorageError> {
        let rows: Vec<BlockRow> = sqlx::query_as(
            "SELECT * FROM block_execution_log WHERE execution_id = $1 ORDER BY started_at, id",
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(read_failed)?;
        rows.into_iter().map(BlockRow::try_into_record).collect()
    }

    async fn finish_execution(
        &self,
        execution_id: ExecutionId,
        ended_at: DateTime<Utc>,
        totals: ExecutionTotals,
        metadata: JsonValue,
    ) -> Result<WorkerExecutionLog, StorageError> {
        let row: Option<ExecutionRow> = sqlx::query_as(
            r#"
            UPDATE worker_execution_log
            SET ended_at = $2,
                duration_ms = GREATEST(0, EXTRACT(EPOCH FROM ($2 - started_at)) * 1000)::BIGINT,
                block_count = $3,
                success_count = $4,
                error_count = $5,
                skipped_count = $6,
                total_cost = $7,
                total_tokens = $8,
                metadata = $9
            WHERE execution_id = $1
            RETURNING *
            "#,
        )
        .bind(execution_id.to_string())
        .bind(ended_at)
        .bind(totals.block_count as i32)
        .bind(totals.success_count as i32)
        .bind(totals.error_count as i32)
        .bind(totals.skipped_count as i32)
        .bind(totals.total_cost)
        .bind(totals.total_tokens as i64)
        .bind(&metadata)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StorageError::ExecutionWriteFailed {
            message: err.to_string(),
        })?;

        row.ok_or_else(|| StorageError::ExecutionNotFound {
            execution_id: execution_id.to_string(),
        })?
        .try_into_record()
    }
}
