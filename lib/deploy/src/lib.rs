//! Deployment change detection.
//!
//! Tracks, per worker, whether the live graph has drifted from the last
//! deployed snapshot. Edits schedule a comparison through a debounce
//! (quiet period after the last edit) combined with a throttle (minimum
//! spacing between comparisons), so rapid editing produces a handful of
//! checks instead of one per keystroke — while detection is never fully
//! suppressed.

pub mod detector;
pub mod error;
pub mod registry;

pub use detector::{ChangeChecker, DeploymentChangeDetector, DetectorConfig, DetectorPhase};
pub use error::DeployError;
pub use registry::DeploymentStatusRegistry;
