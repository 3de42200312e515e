//! Server configuration, loaded from the environment.

use serde::Deserialize;
use std::time::Duration;

/// Top-level configuration for the API server.
///
/// Loaded from `NUSOMA_*` environment variables, with `__` separating
/// nested sections, e.g. `NUSOMA_QUEUE__BATCH_SIZE=25`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub queue: QueueSettings,
    pub executor: ExecutorSettings,
    pub reports: ReportSettings,
    #[serde(default)]
    pub deploy: DeploySettings,
}

/// Tuning for the task queue consumer and its drain loop.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_visibility_timeout_seconds")]
    pub visibility_timeout_seconds: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_drain_interval_seconds")]
    pub drain_interval_seconds: u64,
    /// When false, messages are only drained via `GET /api/tasks/process`.
    #[serde(default = "default_true")]
    pub drain_loop_enabled: bool,
}

/// Where the external execution engine lives.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSettings {
    pub base_url: String,
    #[serde(default = "default_executor_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// Model endpoint used for post-completion report generation.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_report_model")]
    pub model: String,
}

/// Deployment-status caching.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploySettings {
    #[serde(default = "default_registry_ttl_seconds")]
    pub registry_ttl_seconds: u64,
}

impl ServerConfig {
    /// Loads configuration from `NUSOMA_*` environment variables.
    ///
    /// # Errors
    ///
    /// Fails when a required variable is missing or a value cannot be
    /// deserialized into the expected type.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("NUSOMA").separator("__"))
            .build()?
            .try_deserialize()
    }

    #[must_use]
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.queue.visibility_timeout_seconds)
    }

    #[must_use]
    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.queue.drain_interval_seconds)
    }

    #[must_use]
    pub fn registry_ttl(&self) -> Duration {
        Duration::from_secs(self.deploy.registry_ttl_seconds)
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            visibility_timeout_seconds: default_visibility_timeout_seconds(),
            batch_size: default_batch_size(),
            drain_interval_seconds: default_drain_interval_seconds(),
            drain_loop_enabled: true,
        }
    }
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            registry_ttl_seconds: default_registry_ttl_seconds(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_visibility_timeout_seconds() -> u64 {
    60
}

fn default_batch_size() -> usize {
    10
}

fn default_drain_interval_seconds() -> u64 {
    30
}

fn default_executor_timeout_seconds() -> u64 {
    300
}

fn default_report_model() -> String {
    "gpt-4o".to_string()
}

fn default_registry_ttl_seconds() -> u64 {
    300
}

fn default_true() -> bool {
    true
}
