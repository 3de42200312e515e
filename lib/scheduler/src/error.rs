//! Error types for the scheduler crate.

use std::fmt;

/// Errors from schedule configuration and cron evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// A required schedule field is missing for the schedule type.
    MissingField {
        schedule_type: String,
        field: &'static str,
    },
    /// The cron expression could not be parsed.
    InvalidCronExpression { expression: String, reason: String },
    /// The configured timezone is not a known IANA timezone.
    InvalidTimezone { timezone: String },
    /// No occurrence was found within the search horizon.
    NoUpcomingOccurrence { expression: String },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField {
                schedule_type,
                field,
            } => {
                write!(
                    f,
                    "schedule type '{schedule_type}' requires field '{field}'"
                )
            }
            Self::InvalidCronExpression { expression, reason } => {
                write!(f, "invalid cron expression '{expression}': {reason}")
            }
            Self::InvalidTimezone { timezone } => {
                write!(f, "unknown timezone '{timezone}'")
            }
            Self::NoUpcomingOccurrence { expression } => {
                write!(f, "no upcoming occurrence for '{expression}'")
            }
        }
    }
}

impl std::error::Error for ScheduleError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ScheduleError::InvalidCronExpression {
            expression: "bad".to_string(),
            reason: "expected 5 fields".to_string(),
        };
        assert!(err.to_string().contains("bad"));
        assert!(err.to_string().contains("5 fields"));
    }
}
