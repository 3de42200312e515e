//! Error types for deployment change detection.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployError {
    /// The comparison against the deployed snapshot could not run.
    CheckFailed { message: String },
}

impl fmt::Display for DeployError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckFailed { message } => {
                write!(f, "redeployment check failed: {message}")
            }
        }
    }
}

impl std::error::Error for DeployError {}
