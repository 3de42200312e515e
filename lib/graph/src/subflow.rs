//! Subflow types: loop and parallel block groupings.
//!
//! A subflow groups member blocks (those whose `parent_id` points at the
//! subflow id) under shared iteration or fan-out semantics. The config is
//! a tagged union on the subflow type; unknown type tags are a recoverable
//! warning at the deserialize boundary, never a crash.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Polymorphic subflow configuration, tagged by subflow type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubflowConfig {
    /// Sequential iteration over a count or a collection.
    Loop {
        /// Fixed iteration count (used when `for_each` is absent).
        iterations: u32,
        /// Collection to iterate, overriding `iterations` when present.
        #[serde(default)]
        for_each: Option<JsonValue>,
    },
    /// Concurrent fan-out over member blocks.
    Parallel {
        /// Number of concurrent branches.
        count: u32,
        /// Optional collection distributed across branches.
        #[serde(default)]
        distribution: Option<JsonValue>,
    },
}

impl SubflowConfig {
    /// The canonical type tag used in persistence ("loop" / "parallel").
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Loop { .. } => "loop",
            Self::Parallel { .. } => "parallel",
        }
    }

    /// Parses a config from its persisted (type tag, config JSON) pair.
    ///
    /// Returns `None` for an unknown type tag, emitting a warning. The
    /// caller skips the subflow rather than failing the whole load.
    #[must_use]
    pub fn from_tagged(type_tag: &str, config: &JsonValue) -> Option<Self> {
        let result = match type_tag {
            "loop" => serde_json::from_value(tag_value(config, "loop")),
            "parallel" => serde_json::from_value(tag_value(config, "parallel")),
            other => {
                tracing::warn!(subflow_type = other, "skipping subflow with unknown type");
                return None;
            }
        };

        match result {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!(
                    subflow_type = type_tag,
                    error = %e,
                    "skipping subflow with malformed config"
                );
                None
            }
        }
    }

    /// Serializes the config body, without the type tag.
    ///
    /// The tag is stored in its own column; see [`Subflow`].
    #[must_use]
    pub fn to_config_json(&self) -> JsonValue {
        let mut value = serde_json::to_value(self).unwrap_or(JsonValue::Null);
        if let Some(map) = value.as_object_mut() {
            map.remove("type");
        }
        value
    }
}

/// Re-tags a bare config body so serde's tagged-union deserialize applies.
fn tag_value(config: &JsonValue, tag: &str) -> JsonValue {
    let mut value = config.clone();
    if let Some(map) = value.as_object_mut() {
        map.insert("type".to_string(), JsonValue::String(tag.to_string()));
    }
    value
}

/// A subflow row: an id plus its typed config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subflow {
    /// Subflow ID; member blocks reference it via `parent_id`.
    pub id: String,
    /// Typed configuration.
    pub config: SubflowConfig,
}

impl Subflow {
    /// Creates a loop subflow with a fixed iteration count.
    #[must_use]
    pub fn looping(id: impl Into<String>, iterations: u32) -> Self {
        Self {
            id: id.into(),
            config: SubflowConfig::Loop {
                iterations,
                for_each: None,
            },
        }
    }

    /// Creates a parallel subflow with the given branch count.
    #[must_use]
    pub fn parallel(id: impl Into<String>, count: u32) -> Self {
        Self {
            id: id.into(),
            config: SubflowConfig::Parallel {
                count,
                distribution: None,
            },
        }
    }
}
