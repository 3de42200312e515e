//! Error types for execution logging storage.

use std::fmt;

/// Errors from snapshot and log persistence.
///
/// Each variant carries a stable error code (see [`StorageError::code`])
/// so callers can distinguish primary-record failures (which propagate)
/// from secondary-artifact failures (which degrade gracefully).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Failed to persist a snapshot.
    SnapshotWriteFailed { message: String },
    /// Failed to persist the primary execution record.
    ExecutionWriteFailed { message: String },
    /// Failed to persist a block log.
    BlockLogWriteFailed { message: String },
    /// Failed to read back persisted logs.
    ReadFailed { message: String },
    /// The execution record was not found.
    ExecutionNotFound { execution_id: String },
}

impl StorageError {
    /// Stable machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::SnapshotWriteFailed { .. } => "SNAPSHOT_WRITE_FAILED",
            Self::ExecutionWriteFailed { .. } => "EXECUTION_WRITE_FAILED",
            Self::BlockLogWriteFailed { .. } => "BLOCK_LOG_WRITE_FAILED",
            Self::ReadFailed { .. } => "STORAGE_READ_FAILED",
            Self::ExecutionNotFound { .. } => "EXECUTION_NOT_FOUND",
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SnapshotWriteFailed { message } => {
                write!(f, "snapshot write failed: {message}")
            }
            Self::ExecutionWriteFailed { message } => {
                write!(f, "execution log write failed: {message}")
            }
            Self::BlockLogWriteFailed { message } => {
                write!(f, "block log write failed: {message}")
            }
            Self::ReadFailed { message } => write!(f, "storage read failed: {message}"),
            Self::ExecutionNotFound { execution_id } => {
                write!(f, "execution not found: {execution_id}")
            }
        }
    }
}

impl std::error::Error for StorageError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = StorageError::SnapshotWriteFailed {
            message: "disk full".to_string(),
        };
        assert_eq!(err.code(), "SNAPSHOT_WRITE_FAILED");
        assert!(err.to_string().contains("disk full"));
    }
}
