//! Block types for worker graphs.
//!
//! Blocks are the steps of a worker. Each block has:
//! - A caller-assigned ID, unique within the worker
//! - A type string (e.g., "starter", "agent", "function")
//! - Canvas layout fields (purely cosmetic, excluded from the state hash)
//! - A map of sub-block fields holding the user's configuration
//! - Output and data maps, and optional subflow membership

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Canvas position of a block. Cosmetic only.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal canvas coordinate.
    pub x: f64,
    /// Vertical canvas coordinate.
    pub y: f64,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A single configuration field within a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubBlock {
    /// Field identifier (matches the key in the block's sub-block map).
    pub id: String,
    /// The field's widget/value type (e.g., "short-input", "dropdown").
    #[serde(rename = "type")]
    pub kind: String,
    /// The current value, if any.
    pub value: Option<JsonValue>,
}

impl SubBlock {
    /// Creates a sub-block field with a value.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: impl Into<String>, value: JsonValue) -> Self {
        let id = id.into();
        Self {
            id,
            kind: kind.into(),
            value: Some(value),
        }
    }

    /// Returns the value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(JsonValue::as_str)
    }
}

/// A single step in a worker graph.
///
/// Sub-blocks, outputs, and data use `BTreeMap` so that serialization is
/// deterministic, which the state hash depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Caller-assigned ID, unique within the worker.
    pub id: String,
    /// Block type (e.g., "starter", "agent", "api").
    #[serde(rename = "type")]
    pub kind: String,
    /// Display name.
    pub name: String,
    /// Canvas position. Cosmetic.
    #[serde(default)]
    pub position: Position,
    /// Whether the block participates in execution.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Whether connection handles render horizontally. Cosmetic.
    #[serde(default)]
    pub horizontal_handles: bool,
    /// Whether the block renders in wide mode. Cosmetic.
    #[serde(default)]
    pub is_wide: bool,
    /// Rendered height in pixels. Cosmetic.
    #[serde(default)]
    pub height: f64,
    /// Configuration fields keyed by field id.
    #[serde(default)]
    pub sub_blocks: BTreeMap<String, SubBlock>,
    /// Declared outputs keyed by output name.
    #[serde(default)]
    pub outputs: BTreeMap<String, JsonValue>,
    /// Arbitrary block data.
    #[serde(default)]
    pub data: BTreeMap<String, JsonValue>,
    /// Subflow membership: the id of the containing loop/parallel block.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Extent of subflow membership (e.g., "parent").
    #[serde(default)]
    pub extent: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Block {
    /// Creates a new enabled block with empty maps.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            name: name.into(),
            position: Position::default(),
            enabled: true,
            horizontal_handles: false,
            is_wide: false,
            height: 0.0,
            sub_blocks: BTreeMap::new(),
            outputs: BTreeMap::new(),
            data: BTreeMap::new(),
            parent_id: None,
            extent: None,
        }
    }

    /// Sets the canvas position.
    #[must_use]
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    /// Adds a sub-block field.
    #[must_use]
    pub fn with_sub_block(mut self, field: SubBlock) -> Self {
        self.sub_blocks.insert(field.id.clone(), field);
        self
    }

    /// Sets subflow membership.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self.extent = Some("parent".to_string());
        self
    }

    /// Returns true if this is a starter block (the worker's entry point).
    #[must_use]
    pub fn is_starter(&self) -> bool {
        self.kind == "starter"
    }

    /// Returns the string value of a sub-block field, if present.
    #[must_use]
    pub fn sub_block_str(&self, field_id: &str) -> Option<&str> {
        self.sub_blocks.get(field_id).and_then(SubBlock::as_str)
    }

    /// Returns the raw value of a sub-block field, if present.
    #[must_use]
    pub fn sub_block_value(&self, field_id: &str) -> Option<&JsonValue> {
        self.sub_blocks
            .get(field_id)
            .and_then(|f| f.value.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn block_builder_defaults() {
        let block = Block::new("b1", "starter", "Start");
        assert!(block.enabled);
        assert!(block.is_starter());
        assert!(block.sub_blocks.is_empty());
        assert!(block.parent_id.is_none());
    }

    #[test]
    fn sub_block_string_lookup() {
        let block = Block::new("b1", "starter", "Start")
            .with_sub_block(SubBlock::new("scheduleType", "dropdown", json!("daily")));

        assert_eq!(block.sub_block_str("scheduleType"), Some("daily"));
        assert_eq!(block.sub_block_str("missing"), None);
    }

    #[test]
    fn parent_membership_sets_extent() {
        let block = Block::new("b2", "function", "Step").with_parent("loop-1");
        assert_eq!(block.parent_id.as_deref(), Some("loop-1"));
        assert_eq!(block.extent.as_deref(), Some("parent"));
    }

    #[test]
    fn block_serde_roundtrip() {
        let block = Block::new("b1", "agent", "Agent")
            .at(100.0, 200.0)
            .with_sub_block(SubBlock::new("model", "dropdown", json!("gpt-4o")));

        let json = serde_json::to_string(&block).expect("serialize");
        let parsed: Block = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(block, parsed);
    }

    #[test]
    fn missing_layout_fields_default() {
        let parsed: Block =
            serde_json::from_str(r#"{"id":"b1","type":"starter","name":"Start"}"#)
                .expect("deserialize");
        assert!(parsed.enabled);
        assert_eq!(parsed.position, Position::default());
        assert_eq!(parsed.height, 0.0);
    }
}
