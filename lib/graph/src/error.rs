//! Error types for the graph crate.

use std::fmt;

/// Errors from graph operations.
///
/// These errors contain only information available at the graph layer.
/// Worker-level context (like the worker id) is added by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Block with the given ID was not found in the graph.
    BlockNotFound { block_id: String },
    /// A block with this ID already exists in the graph.
    DuplicateBlock { block_id: String },
    /// An edge with this ID already exists in the graph.
    DuplicateEdge { edge_id: String },
    /// A block references a parent subflow that does not exist.
    ParentNotFound { block_id: String, parent_id: String },
    /// An edge endpoint references a missing block.
    EdgeEndpointMissing { edge_id: String, block_id: String },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockNotFound { block_id } => {
                write!(f, "block not found: {block_id}")
            }
            Self::DuplicateBlock { block_id } => {
                write!(f, "duplicate block id: {block_id}")
            }
            Self::DuplicateEdge { edge_id } => {
                write!(f, "duplicate edge id: {edge_id}")
            }
            Self::ParentNotFound {
                block_id,
                parent_id,
            } => {
                write!(
                    f,
                    "block {block_id} references missing parent subflow {parent_id}"
                )
            }
            Self::EdgeEndpointMissing { edge_id, block_id } => {
                write!(f, "edge {edge_id} references missing block {block_id}")
            }
        }
    }
}

impl std::error::Error for GraphError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = GraphError::BlockNotFound {
            block_id: "b1".to_string(),
        };
        assert!(err.to_string().contains("block not found"));

        let err = GraphError::EdgeEndpointMissing {
            edge_id: "e1".to_string(),
            block_id: "b9".to_string(),
        };
        assert!(err.to_string().contains("e1"));
        assert!(err.to_string().contains("b9"));
    }
}
