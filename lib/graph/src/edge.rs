//! Edge types for worker graphs.
//!
//! Edges connect blocks by id, optionally naming the specific handle on
//! each side (e.g., a condition branch handle on a router block).

use serde::{Deserialize, Serialize};

/// A directed connection between two blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Caller-assigned edge ID, unique within the worker.
    pub id: String,
    /// Source block ID.
    pub source: String,
    /// Target block ID.
    pub target: String,
    /// Handle on the source block, if not the default.
    #[serde(default)]
    pub source_handle: Option<String>,
    /// Handle on the target block, if not the default.
    #[serde(default)]
    pub target_handle: Option<String>,
}

impl Edge {
    /// Creates an edge between default handles.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    /// Sets the source handle.
    #[must_use]
    pub fn from_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    /// Sets the target handle.
    #[must_use]
    pub fn to_handle(mut self, handle: impl Into<String>) -> Self {
        self.target_handle = Some(handle.into());
        self
    }
}
