//! Per-execution and per-block log records, plus cost aggregation.

use chrono::{DateTime, Utc};
use nusoma_core::{ExecutionId, SnapshotId, WorkerId};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

/// Maximum serialized size of a stored block input/output payload.
/// Larger payloads are replaced by a marker object with a preview.
const MAX_PAYLOAD_BYTES: usize = 8 * 1024;

/// What kicked off an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Manual,
    Schedule,
    Queue,
    Api,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Schedule => "schedule",
            Self::Queue => "queue",
            Self::Api => "api",
        }
    }
}

impl std::str::FromStr for TriggerSource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "schedule" => Ok(Self::Schedule),
            "queue" => Ok(Self::Queue),
            "api" => Ok(Self::Api),
            _ => Err(()),
        }
    }
}

/// Outcome of a single block run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Success,
    Error,
    Skipped,
}

impl BlockStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

impl std::str::FromStr for BlockStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "skipped" => Ok(Self::Skipped),
            _ => Err(()),
        }
    }
}

/// Token counts for one model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    #[must_use]
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Cost attribution for one block, when the block called a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Cost of prompt tokens, in USD.
    pub input: f64,
    /// Cost of completion tokens, in USD.
    pub output: f64,
    /// `input + output`, in USD.
    pub total: f64,
    pub tokens: TokenUsage,
    pub model: String,
    /// Per-million-token prices used, e.g. `{"input": 3.0, "output": 15.0}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<JsonValue>,
}

/// One block's run within an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockExecutionLog {
    pub id: String,
    pub execution_id: ExecutionId,
    pub block_id: String,
    pub block_type: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub status: BlockStatus,
    /// Truncated input payload.
    pub input: JsonValue,
    /// Truncated output payload.
    pub output: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostBreakdown>,
    /// Tool calls, iteration index, and similar per-block extras.
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub metadata: JsonValue,
}

impl BlockExecutionLog {
    /// Builds a block log, truncating payloads and clamping duration.
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        block_id: impl Into<String>,
        block_type: impl Into<String>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        status: BlockStatus,
        input: &JsonValue,
        output: &JsonValue,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            execution_id,
            block_id: block_id.into(),
            block_type: block_type.into(),
            started_at,
            ended_at,
            duration_ms: (ended_at - started_at).num_milliseconds().max(0),
            status,
            input: truncate_payload(input),
            output: truncate_payload(output),
            cost: None,
            metadata: JsonValue::Null,
        }
    }

    #[must_use]
    pub fn with_cost(mut self, cost: CostBreakdown) -> Self {
        self.cost = Some(cost);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Aggregates computed once from the full set of block logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTotals {
    pub block_count: u32,
    pub success_count: u32,
    pub error_count: u32,
    pub skipped_count: u32,
    /// Sum of every block's `cost.total`, in USD.
    pub total_cost: f64,
    pub total_tokens: u64,
}

impl ExecutionTotals {
    /// Computes totals from the complete block-log set.
    ///
    /// This is the only way totals are produced. Recomputing from the
    /// full set at completion (instead of incrementing as blocks finish)
    /// makes concurrent block writes inside a parallel subflow safe.
    #[must_use]
    pub fn from_blocks(blocks: &[BlockExecutionLog]) -> Self {
        let mut totals = Self {
            block_count: blocks.len() as u32,
            ..Self::default()
        };
        for block in blocks {
            match block.status {
                BlockStatus::Success => totals.success_count += 1,
                BlockStatus::Error => totals.error_count += 1,
                BlockStatus::Skipped => totals.skipped_count += 1,
            }
            if let Some(cost) = &block.cost {
                totals.total_cost += cost.total;
                totals.total_tokens += cost.tokens.total_tokens;
            }
        }
        totals
    }
}

/// One row per execution, referencing the resolved snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerExecutionLog {
    pub id: String,
    pub worker_id: WorkerId,
    pub execution_id: ExecutionId,
    pub state_snapshot_id: SnapshotId,
    pub trigger: TriggerSource,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(flatten)]
    pub totals: ExecutionTotals,
    /// Trigger payload, trace spans, error details.
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub metadata: JsonValue,
}

/// Caps a payload at [`MAX_PAYLOAD_BYTES`] of serialized JSON.
///
/// Oversized payloads are replaced by a marker object carrying the
/// original size and a prefix of the serialized form, so logs stay
/// readable without storing multi-megabyte block outputs.
#[must_use]
pub fn truncate_payload(value: &JsonValue) -> JsonValue {
    let serialized = value.to_string();
    if serialized.len() <= MAX_PAYLOAD_BYTES {
        return value.clone();
    }

    let mut cut = MAX_PAYLOAD_BYTES.min(serialized.len());
    while !serialized.is_char_boundary(cut) {
        cut -= 1;
    }

    tracing::debug!(
        original_bytes = serialized.len(),
        "truncating oversized block payload"
    );

    json!({
        "truncated": true,
        "original_bytes": serialized.len(),
        "preview": &serialized[..cut],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap()
    }

    fn block(status: BlockStatus, cost: Option<CostBreakdown>) -> BlockExecutionLog {
        let mut log = BlockExecutionLog::new(
            ExecutionId::new(),
            "blk",
            "agent",
            at(0),
            at(1),
            status,
            &json!({"in": 1}),
            &json!({"out": 2}),
        );
        log.cost = cost;
        log
    }

    fn cost(total: f64, tokens: u64) -> CostBreakdown {
        CostBreakdown {
            input: total / 2.0,
            output: total / 2.0,
            total,
            tokens: TokenUsage {
                prompt_tokens: tokens / 2,
                completion_tokens: tokens - tokens / 2,
                total_tokens: tokens,
            },
            model: "gpt-4o".to_string(),
            pricing: None,
        }
    }

    #[test]
    fn totals_count_statuses() {
        let blocks = vec![
            block(BlockStatus::Success, None),
            block(BlockStatus::Success, None),
            block(BlockStatus::Error, None),
            block(BlockStatus::Skipped, None),
        ];
        let totals = ExecutionTotals::from_blocks(&blocks);
        assert_eq!(totals.block_count, 4);
        assert_eq!(totals.success_count, 2);
        assert_eq!(totals.error_count, 1);
        assert_eq!(totals.skipped_count, 1);
    }

    #[test]
    fn total_cost_is_sum_of_block_costs() {
        let blocks = vec![
            block(BlockStatus::Success, Some(cost(0.012, 340))),
            block(BlockStatus::Success, None),
            block(BlockStatus::Error, Some(cost(0.003, 90))),
        ];
        let totals = ExecutionTotals::from_blocks(&blocks);

        let expected: f64 = blocks
            .iter()
            .filter_map(|b| b.cost.as_ref())
            .map(|c| c.total)
            .sum();
        assert!((totals.total_cost - expected).abs() < 1e-12);
        assert_eq!(totals.total_tokens, 430);
    }

    #[test]
    fn small_payloads_pass_through_unchanged() {
        let value = json!({"result": [1, 2, 3]});
        assert_eq!(truncate_payload(&value), value);
    }

    #[test]
    fn oversized_payloads_become_markers() {
        let value = json!({"blob": "x".repeat(100_000)});
        let truncated = truncate_payload(&value);
        assert_eq!(truncated["truncated"], json!(true));
        assert!(truncated["preview"].as_str().unwrap().len() <= MAX_PAYLOAD_BYTES);
        assert!(truncated["original_bytes"].as_u64().unwrap() > MAX_PAYLOAD_BYTES as u64);
    }

    #[test]
    fn block_log_clamps_negative_duration() {
        let log = BlockExecutionLog::new(
            ExecutionId::new(),
            "blk",
            "api",
            at(5),
            at(3),
            BlockStatus::Error,
            &JsonValue::Null,
            &JsonValue::Null,
        );
        assert_eq!(log.duration_ms, 0);
    }

    #[test]
    fn token_usage_totals_its_parts() {
        let usage = TokenUsage::new(120, 30);
        assert_eq!(usage.total_tokens, 150);
    }
}
