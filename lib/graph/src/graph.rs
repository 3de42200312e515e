//! Worker graph container using petgraph.
//!
//! Workers are directed graphs where:
//! - Nodes are blocks identified by caller-assigned string ids
//! - Edges connect a source block handle to a target block handle
//! - Subflows group member blocks by `parent_id`
//!
//! The graph is persisted in normalized tables (blocks, edges, subflows);
//! this container is the in-memory form the rest of the platform works with.

use crate::block::Block;
use crate::edge::Edge;
use crate::error::GraphError;
use crate::subflow::Subflow;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A worker graph using petgraph's directed graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerGraph {
    /// The underlying directed graph.
    #[serde(with = "graph_serde")]
    graph: DiGraph<Block, Edge>,
    /// Subflows keyed by subflow id. BTreeMap for deterministic order.
    #[serde(default)]
    subflows: BTreeMap<String, Subflow>,
    /// Map from block id to petgraph's NodeIndex for O(1) lookup.
    #[serde(skip)]
    block_index_map: HashMap<String, NodeIndex>,
}

impl WorkerGraph {
    /// Creates a new empty worker graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            subflows: BTreeMap::new(),
            block_index_map: HashMap::new(),
        }
    }

    /// Adds a block to the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if a block with the same id already exists.
    pub fn add_block(&mut self, block: Block) -> Result<(), GraphError> {
        if self.block_index_map.contains_key(&block.id) {
            return Err(GraphError::DuplicateBlock { block_id: block.id });
        }
        let block_id = block.id.clone();
        let index = self.graph.add_node(block);
        self.block_index_map.insert(block_id, index);
        Ok(())
    }

    /// Removes a block from the graph.
    ///
    /// Also removes all edges connected to this block.
    pub fn remove_block(&mut self, block_id: &str) -> Option<Block> {
        let index = self.block_index_map.remove(block_id)?;
        let removed = self.graph.remove_node(index);
        // petgraph swaps the last node into the removed slot; rebuild.
        self.rebuild_index_map();
        removed
    }

    /// Returns a reference to a block by its id.
    #[must_use]
    pub fn get_block(&self, block_id: &str) -> Option<&Block> {
        let index = self.block_index_map.get(block_id)?;
        self.graph.node_weight(*index)
    }

    /// Adds an edge between two blocks.
    ///
    /// # Errors
    ///
    /// Returns an error if either endpoint block does not exist or the
    /// edge id is already present.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        if self.edges().any(|e| e.id == edge.id) {
            return Err(GraphError::DuplicateEdge { edge_id: edge.id });
        }

        let source_index =
            *self
                .block_index_map
                .get(&edge.source)
                .ok_or_else(|| GraphError::EdgeEndpointMissing {
                    edge_id: edge.id.clone(),
                    block_id: edge.source.clone(),
                })?;

        let target_index =
            *self
                .block_index_map
                .get(&edge.target)
                .ok_or_else(|| GraphError::EdgeEndpointMissing {
                    edge_id: edge.id.clone(),
                    block_id: edge.target.clone(),
                })?;

        self.graph.add_edge(source_index, target_index, edge);
        Ok(())
    }

    /// Adds a subflow. Replaces any existing subflow with the same id.
    pub fn add_subflow(&mut self, subflow: Subflow) {
        self.subflows.insert(subflow.id.clone(), subflow);
    }

    /// Returns a subflow by id.
    #[must_use]
    pub fn get_subflow(&self, subflow_id: &str) -> Option<&Subflow> {
        self.subflows.get(subflow_id)
    }

    /// Returns all blocks in the graph.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.graph.node_weights()
    }

    /// Returns all edges in the graph.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.graph.edge_weights()
    }

    /// Returns all subflows in the graph, ordered by id.
    pub fn subflows(&self) -> impl Iterator<Item = &Subflow> {
        self.subflows.values()
    }

    /// Returns the number of blocks in the graph.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the number of subflows in the graph.
    #[must_use]
    pub fn subflow_count(&self) -> usize {
        self.subflows.len()
    }

    /// Returns true if the graph has no blocks, edges, or subflows.
    ///
    /// An empty graph is a valid save target (delete-only replace).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.block_count() == 0 && self.subflows.is_empty()
    }

    /// Returns the starter block, if the graph has one.
    #[must_use]
    pub fn starter_block(&self) -> Option<&Block> {
        self.blocks().find(|b| b.is_starter())
    }

    /// Returns the downstream blocks of a given block.
    pub fn successors(&self, block_id: &str) -> Vec<(&Block, &Edge)> {
        let Some(&index) = self.block_index_map.get(block_id) else {
            return Vec::new();
        };

        self.graph
            .edges_directed(index, Direction::Outgoing)
            .filter_map(|edge| {
                let target = self.graph.node_weight(edge.target())?;
                Some((target, edge.weight()))
            })
            .collect()
    }

    /// Validates the worker graph.
    ///
    /// Checks that every block's `parent_id` references an existing subflow
    /// whose backing block exists. Edge endpoints are validated at insert
    /// time, so a constructed graph cannot contain dangling edges.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first validation failure.
    pub fn validate(&self) -> Result<(), GraphError> {
        for block in self.blocks() {
            if let Some(parent_id) = &block.parent_id {
                if !self.block_index_map.contains_key(parent_id) {
                    return Err(GraphError::ParentNotFound {
                        block_id: block.id.clone(),
                        parent_id: parent_id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Rebuilds the block index map after deserialization.
    pub fn rebuild_index_map(&mut self) {
        self.block_index_map.clear();
        for index in self.graph.node_indices() {
            if let Some(block) = self.graph.node_weight(index) {
                self.block_index_map.insert(block.id.clone(), index);
            }
        }
    }
}

impl Default for WorkerGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom serde for petgraph DiGraph.
mod graph_serde {
    use super::*;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeStruct;

    pub fn serialize<S>(graph: &DiGraph<Block, Edge>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let blocks: Vec<_> = graph.node_weights().cloned().collect();
        let edges: Vec<_> = graph.edge_weights().cloned().collect();

        let mut state = serializer.serialize_struct("Graph", 2)?;
        state.serialize_field("blocks", &blocks)?;
        state.serialize_field("edges", &edges)?;
        state.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DiGraph<Block, Edge>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct GraphVisitor;

        impl<'de> Visitor<'de> for GraphVisitor {
            type Value = DiGraph<Block, Edge>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a worker graph with blocks and edges")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut blocks: Option<Vec<Block>> = None;
                let mut edges: Option<Vec<Edge>> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "blocks" => blocks = Some(map.next_value()?),
                        "edges" => edges = Some(map.next_value()?),
                        _ => {
                            let _ = map.next_value::<serde::de::IgnoredAny>()?;
                        }
                    }
                }

                let blocks = blocks.unwrap_or_default();
                let edges = edges.unwrap_or_default();

                let mut graph = DiGraph::new();
                let mut id_to_index = HashMap::new();

                for block in blocks {
                    let id = block.id.clone();
                    let index = graph.add_node(block);
                    id_to_index.insert(id, index);
                }

                for edge in edges {
                    let (Some(&source_idx), Some(&target_idx)) =
                        (id_to_index.get(&edge.source), id_to_index.get(&edge.target))
                    else {
                        continue;
                    };
                    graph.add_edge(source_idx, target_idx, edge);
                }

                Ok(graph)
            }
        }

        deserializer.deserialize_struct("Graph", &["blocks", "edges"], GraphVisitor)
    }
}
