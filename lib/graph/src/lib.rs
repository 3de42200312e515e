//! Worker graph model for the nusoma platform.
//!
//! A worker is a saved workflow definition: a directed graph of blocks
//! connected by edges, optionally grouped into loop/parallel subflows.
//! This crate provides:
//!
//! - **Block Model**: blocks with typed sub-block fields, outputs, and data
//! - **Edges**: handle-to-handle connections validated against block ids
//! - **Subflows**: a tagged union of loop and parallel grouping configs
//! - **Graph Container**: petgraph-backed structure with id lookup
//! - **State Hash**: deterministic content hash for snapshot dedup and
//!   redeployment detection

pub mod block;
pub mod edge;
pub mod error;
pub mod graph;
pub mod hash;
pub mod subflow;

pub use block::{Block, Position, SubBlock};
pub use edge::Edge;
pub use error::GraphError;
pub use graph::WorkerGraph;
pub use hash::state_hash;
pub use subflow::{Subflow, SubflowConfig};
