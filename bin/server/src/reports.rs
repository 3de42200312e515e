//! HTTP report generation against an OpenAI-compatible completion API.

use async_trait::async_trait;
use nusoma_execution::TokenUsage;
use nusoma_queue::{GeneratedText, ReportGenerator};
use serde::Deserialize;
use serde_json::json;
use std::fmt;

/// Failure talking to the report model endpoint.
#[derive(Debug)]
pub struct ReportError {
    message: String,
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "report generation failed: {}", self.message)
    }
}

impl std::error::Error for ReportError {}

fn report_error(err: impl fmt::Display) -> ReportError {
    ReportError {
        message: err.to_string(),
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: CompletionUsage,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Per-million-token prices used to attribute report cost.
const INPUT_PRICE_PER_MILLION: f64 = 2.5;
const OUTPUT_PRICE_PER_MILLION: f64 = 10.0;

/// Calls a chat-completions endpoint to write task reports.
pub struct HttpReportGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpReportGenerator {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl ReportGenerator for HttpReportGenerator {
    type Error = ReportError;

    async fn generate_text(&self, model: &str, prompt: &str) -> Result<GeneratedText, ReportError> {
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(report_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(report_error(format!("model endpoint returned {status}")));
        }

        let payload: CompletionResponse = response.json().await.map_err(report_error)?;
        let text = payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| report_error("response contained no choices"))?;

        let usage = TokenUsage::new(payload.usage.prompt_tokens, payload.usage.completion_tokens);
        let cost = (usage.prompt_tokens as f64 * INPUT_PRICE_PER_MILLION
            + usage.completion_tokens as f64 * OUTPUT_PRICE_PER_MILLION)
            / 1_000_000.0;

        Ok(GeneratedText { text, usage, cost })
    }
}
