//! Deterministic state hashing for worker graphs.
//!
//! The state hash is the single authoritative definition of "material
//! difference" between two graphs: snapshot dedup and redeployment
//! detection both compare this hash. It covers blocks, edges, and
//! subflows but excludes purely cosmetic fields (canvas position,
//! width/height flags, handle orientation), so moving a block around the
//! canvas never triggers a new snapshot or a redeployment prompt.

use crate::block::Block;
use crate::edge::Edge;
use crate::graph::WorkerGraph;
use crate::subflow::Subflow;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// The material fields of a block, in canonical order.
#[derive(Serialize)]
struct CanonicalBlock<'a> {
    id: &'a str,
    kind: &'a str,
    name: &'a str,
    enabled: bool,
    sub_blocks: &'a BTreeMap<String, crate::block::SubBlock>,
    outputs: &'a BTreeMap<String, JsonValue>,
    data: &'a BTreeMap<String, JsonValue>,
    parent_id: Option<&'a str>,
    extent: Option<&'a str>,
}

impl<'a> From<&'a Block> for CanonicalBlock<'a> {
    fn from(block: &'a Block) -> Self {
        Self {
            id: &block.id,
            kind: &block.kind,
            name: &block.name,
            enabled: block.enabled,
            sub_blocks: &block.sub_blocks,
            outputs: &block.outputs,
            data: &block.data,
            parent_id: block.parent_id.as_deref(),
            extent: block.extent.as_deref(),
        }
    }
}

/// The canonical form hashed for snapshot identity.
#[derive(Serialize)]
struct CanonicalGraph<'a> {
    blocks: Vec<CanonicalBlock<'a>>,
    edges: Vec<&'a Edge>,
    subflows: Vec<&'a Subflow>,
}

impl<'a> CanonicalGraph<'a> {
    fn from_graph(graph: &'a WorkerGraph) -> Self {
        let mut blocks: Vec<CanonicalBlock<'a>> = graph.blocks().map(Into::into).collect();
        blocks.sort_by(|a, b| a.id.cmp(b.id));

        let mut edges: Vec<&'a Edge> = graph.edges().collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));

        // Subflows iterate in id order already (BTreeMap).
        let subflows: Vec<&'a Subflow> = graph.subflows().collect();

        Self {
            blocks,
            edges,
            subflows,
        }
    }
}

/// Computes the deterministic state hash of a worker graph.
///
/// Identical graph content (up to cosmetic fields) always produces the
/// same hex-encoded SHA-256 digest, regardless of insertion order.
#[must_use]
pub fn state_hash(graph: &WorkerGraph) -> String {
    let canonical = CanonicalGraph::from_graph(graph);
    let json = serde_json::to_string(&canonical)
        .unwrap_or_else(|_| String::from("{}"));

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}
