//! Report generation for completed tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nusoma_execution::TokenUsage;

/// Text produced by the report model, with its own cost attribution.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedText {
    pub text: String,
    pub usage: TokenUsage,
    /// Cost of this generation in USD. Added to the execution cost to
    /// form the task's `totalCost`.
    pub cost: f64,
}

/// The LLM seam used to turn raw execution output into a report.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn generate_text(&self, model: &str, prompt: &str) -> Result<GeneratedText, Self::Error>;
}

/// Degraded placeholder used when report generation fails.
///
/// The task still completes; only the prose is missing. Report cost is
/// zero since no generation happened.
#[must_use]
pub fn fallback_report(description: &str, completed_at: DateTime<Utc>) -> GeneratedText {
    GeneratedText {
        text: format!(
            "Task \"{description}\" completed at {}. A detailed report could not be generated.",
            completed_at.to_rfc3339()
        ),
        usage: TokenUsage::default(),
        cost: 0.0,
    }
}

/// Report text for a failed execution.
#[must_use]
pub fn failure_report(description: &str, error: &str, failed_at: DateTime<Utc>) -> String {
    format!(
        "Task \"{description}\" failed at {}: {error}",
        failed_at.to_rfc3339()
    )
}
