//! Normalized graph persistence.
//!
//! A worker's graph is stored across three tables (blocks, edges,
//! subflows). Saving is replace-on-write: one transaction deletes the
//! worker's existing rows and bulk-inserts the new set, so concurrent
//! saves serialize per worker and a crash never leaves a half-written
//! graph behind.

use super::decode_error;
use chrono::{DateTime, Utc};
use nusoma_core::WorkerId;
use nusoma_graph::{Block, Edge, Position, SubBlock, Subflow, SubflowConfig, WorkerGraph};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;

#[derive(FromRow)]
struct BlockRow {
    id: String,
    #[sqlx(rename = "type")]
    kind: String,
    name: String,
    position_x: String,
    position_y: String,
    enabled: bool,
    horizontal_handles: bool,
    is_wide: bool,
    height: String,
    sub_blocks: JsonValue,
    outputs: JsonValue,
    data: JsonValue,
    parent_id: Option<String>,
    extent: Option<String>,
}

#[derive(FromRow)]
struct EdgeRow {
    id: String,
    source_block_id: String,
    target_block_id: String,
    source_handle: Option<String>,
    target_handle: Option<String>,
}

#[derive(FromRow)]
struct SubflowRow {
    id: String,
    #[sqlx(rename = "type")]
    kind: String,
    config: JsonValue,
}

impl BlockRow {
    fn try_into_block(self) -> Result<Block, sqlx::Error> {
        let sub_blocks: BTreeMap<String, SubBlock> =
            serde_json::from_value(self.sub_blocks).map_err(decode_error)?;
        let outputs: BTreeMap<String, JsonValue> =
            serde_json::from_value(self.outputs).map_err(decode_error)?;
        let data: BTreeMap<String, JsonValue> =
            serde_json::from_value(self.data).map_err(decode_error)?;

        let mut block = Block::new(self.id, self.kind, self.name);
        block.position = Position::new(
            parse_layout(&self.position_x, "position_x"),
            parse_layout(&self.position_y, "position_y"),
        );
        block.enabled = self.enabled;
        block.horizontal_handles = self.horizontal_handles;
        block.is_wide = self.is_wide;
        block.height = parse_layout(&self.height, "height");
        block.sub_blocks = sub_blocks;
        block.outputs = outputs;
        block.data = data;
        block.parent_id = self.parent_id;
        block.extent = self.extent;
        Ok(block)
    }
}

impl EdgeRow {
    fn into_edge(self) -> Edge {
        let mut edge = Edge::new(self.id, self.source_block_id, self.target_block_id);
        edge.source_handle = self.source_handle;
        edge.target_handle = self.target_handle;
        edge
    }
}

impl SubflowRow {
    /// `None` for unknown or malformed configs; the load skips the row.
    fn into_subflow(self) -> Option<Subflow> {
        let config = SubflowConfig::from_tagged(&self.kind, &self.config)?;
        Some(Subflow {
            id: self.id,
            config,
        })
    }
}

/// Parses a persisted decimal-string layout value.
///
/// Layout numbers are cosmetic, so a malformed value degrades to 0.0
/// with a warning instead of failing the whole load.
fn parse_layout(raw: &str, field: &'static str) -> f64 {
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(field, raw, "unparsable layout value, defaulting to 0");
            0.0
        }
    }
}

fn encode_error(err: serde_json::Error) -> sqlx::Error {
    sqlx::Error::Encode(Box::new(err))
}

/// Loads and saves worker graphs against the normalized tables.
#[derive(Clone)]
pub struct GraphStore {
    pool: PgPool,
}

impl GraphStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads a worker's graph.
    ///
    /// Returns `Ok(None)` when the worker has no graph rows at all,
    /// which callers treat as "no graph saved yet".
    pub async fn load_graph(
        &self,
        worker_id: WorkerId,
    ) -> Result<Option<WorkerGraph>, sqlx::Error> {
        let id = worker_id.to_string();

        let block_rows: Vec<BlockRow> =
            sqlx::query_as("SELECT * FROM worker_blocks WHERE worker_id = $1 ORDER BY id")
                .bind(&id)
                .fetch_all(&self.pool)
                .await?;
        let edge_rows: Vec<EdgeRow> = sqlx::query_as(
            "SELECT id, source_block_id, target_block_id, source_handle, target_handle
             FROM worker_edges WHERE worker_id = $1 ORDER BY id",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;
        let subflow_rows: Vec<SubflowRow> =
            sqlx::query_as("SELECT id, type, config FROM worker_subflows WHERE worker_id = $1")
                .bind(&id)
                .fetch_all(&self.pool)
                .await?;

        if block_rows.is_empty() && edge_rows.is_empty() && subflow_rows.is_empty() {
            return Ok(None);
        }

        let mut graph = WorkerGraph::new();
        for row in block_rows {
            let block = row.try_into_block()?;
            if let Err(err) = graph.add_block(block) {
                tracing::warn!(worker_id = %worker_id, error = %err, "skipping block row");
            }
        }
        for row in edge_rows {
            let edge = row.into_edge();
            if let Err(err) = graph.add_edge(edge) {
                // Dangling edges can only come from out-of-band writes.
                tracing::warn!(worker_id = %worker_id, error = %err, "skipping edge row");
            }
        }
        for row in subflow_rows {
            if let Some(subflow) = row.into_subflow() {
                graph.add_subflow(subflow);
            }
        }

        Ok(Some(graph))
    }

    /// Replaces a worker's stored graph in one transaction.
    pub async fn save_graph(
        &self,
        worker_id: WorkerId,
        graph: &WorkerGraph,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let id = worker_id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM worker_blocks WHERE worker_id = $1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM worker_edges WHERE worker_id = $1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM worker_subflows WHERE worker_id = $1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        for block in graph.blocks() {
            sqlx::query(
                r#"
                INSERT INTO worker_blocks
                    (id, worker_id, type, name, position_x, position_y, enabled,
                     horizontal_handles, is_wide, height, sub_blocks, outputs,
                     data, parent_id, extent)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(&block.id)
            .bind(&id)
            .bind(&block.kind)
            .bind(&block.name)
            .bind(block.position.x.to_string())
            .bind(block.position.y.to_string())
            .bind(block.enabled)
            .bind(block.horizontal_handles)
            .bind(block.is_wide)
            .bind(block.height.to_string())
            .bind(serde_json::to_value(&block.sub_blocks).map_err(encode_error)?)
            .bind(serde_json::to_value(&block.outputs).map_err(encode_error)?)
            .bind(serde_json::to_value(&block.data).map_err(encode_error)?)
            .bind(&block.parent_id)
            .bind(&block.extent)
            .execute(&mut *tx)
            .await?;
        }

        for edge in graph.edges() {
            sqlx::query(
                r#"
                INSERT INTO worker_edges
                    (id, worker_id, source_block_id, target_block_id,
                     source_handle, target_handle)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&edge.id)
            .bind(&id)
            .bind(&edge.source)
            .bind(&edge.target)
            .bind(&edge.source_handle)
            .bind(&edge.target_handle)
            .execute(&mut *tx)
            .await?;
        }

        for subflow in graph.subflows() {
            sqlx::query(
                r#"
                INSERT INTO worker_subflows (id, worker_id, type, config)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(&subflow.id)
            .bind(&id)
            .bind(subflow.config.type_tag())
            .bind(subflow.config.to_config_json())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE workers SET last_synced = $2, updated_at = $2 WHERE id = $1")
            .bind(&id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn layout_values_parse_as_decimal_strings() {
        assert_eq!(parse_layout("123.5", "position_x"), 123.5);
        assert_eq!(parse_layout("-40", "position_y"), -40.0);
    }

    #[test]
    fn malformed_layout_value_defaults_to_zero() {
        assert_eq!(parse_layout("12,5", "height"), 0.0);
        assert_eq!(parse_layout("", "height"), 0.0);
    }

    #[test]
    fn block_row_round_trips_through_conversion() {
        let row = BlockRow {
            id: "agent-1".to_string(),
            kind: "agent".to_string(),
            name: "Agent".to_string(),
            position_x: "120.5".to_string(),
            position_y: "-30".to_string(),
            enabled: true,
            horizontal_handles: false,
            is_wide: true,
            height: "640".to_string(),
            sub_blocks: json!({
                "model": {"id": "model", "type": "dropdown", "value": "gpt-4o"}
            }),
            outputs: json!({"response": {"type": "string"}}),
            data: json!({}),
            parent_id: Some("loop-1".to_string()),
            extent: Some("parent".to_string()),
        };

        let block = row.try_into_block().expect("convert");
        assert_eq!(block.id, "agent-1");
        assert_eq!(block.position, Position::new(120.5, -30.0));
        assert_eq!(block.height, 640.0);
        assert_eq!(block.sub_block_str("model"), Some("gpt-4o"));
        assert_eq!(block.parent_id.as_deref(), Some("loop-1"));
    }

    #[test]
    fn malformed_sub_blocks_fail_the_conversion() {
        let row = BlockRow {
            id: "b1".to_string(),
            kind: "api".to_string(),
            name: "Api".to_string(),
            position_x: "0".to_string(),
            position_y: "0".to_string(),
            enabled: true,
            horizontal_handles: false,
            is_wide: false,
            height: "0".to_string(),
            sub_blocks: json!([1, 2, 3]),
            outputs: json!({}),
            data: json!({}),
            parent_id: None,
            extent: None,
        };
        assert!(row.try_into_block().is_err());
    }

    #[test]
    fn unknown_subflow_type_is_skipped_on_load() {
        let row = SubflowRow {
            id: "s1".to_string(),
            kind: "pipeline".to_string(),
            config: json!({}),
        };
        assert!(row.into_subflow().is_none());
    }

    #[test]
    fn subflow_row_round_trips() {
        let row = SubflowRow {
            id: "loop-1".to_string(),
            kind: "loop".to_string(),
            config: json!({"iterations": 5}),
        };
        let subflow = row.into_subflow().expect("known type");
        assert_eq!(subflow.config.type_tag(), "loop");
        let body = subflow.config.to_config_json();
        assert!(body.get("type").is_none());
        assert_eq!(body["iterations"], 5);
    }
}
