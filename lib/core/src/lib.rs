//! Core domain types for the nusoma workflow platform.
//!
//! This crate provides the strongly-typed identifiers shared by the
//! workflow orchestration crates.

pub mod id;

pub use id::{
    ExecutionId, ParseIdError, ScheduleId, SnapshotId, TaskId, UserId, WorkerId, WorkspaceId,
};
