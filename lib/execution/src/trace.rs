//! Trace spans for execution visualization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, timed, nestable segment of an execution.
///
/// Spans form a tree: the root covers the whole run, children cover
/// blocks, loop iterations, or parallel branches. The tree is stored as
/// part of the execution log's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSpan {
    pub name: String,
    /// Span category, e.g. "workflow", "block", "iteration".
    #[serde(rename = "type")]
    pub kind: String,
    /// Block this span covers, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
    /// "success" or "error".
    pub status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TraceSpan>,
}

impl TraceSpan {
    /// Creates a leaf span over the given interval.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            block_id: None,
            started_at,
            ended_at,
            duration_ms: (ended_at - started_at).num_milliseconds().max(0),
            status: status.into(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn for_block(mut self, block_id: impl Into<String>) -> Self {
        self.block_id = Some(block_id.into());
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: TraceSpan) -> Self {
        self.children.push(child);
        self
    }

    /// Total number of spans in this subtree, including self.
    #[must_use]
    pub fn span_count(&self) -> usize {
        1 + self.children.iter().map(TraceSpan::span_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap()
    }

    #[test]
    fn duration_is_never_negative() {
        let span = TraceSpan::new("block", "block", at(5), at(3), "error");
        assert_eq!(span.duration_ms, 0);
    }

    #[test]
    fn span_count_walks_the_tree() {
        let root = TraceSpan::new("workflow", "workflow", at(0), at(10), "success")
            .with_child(TraceSpan::new("agent", "block", at(0), at(4), "success"))
            .with_child(
                TraceSpan::new("loop", "iteration", at(4), at(9), "success")
                    .with_child(TraceSpan::new("api", "block", at(4), at(6), "success")),
            );
        assert_eq!(root.span_count(), 4);
    }
}
