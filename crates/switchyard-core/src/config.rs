//! Router configuration.
//!
//! Loaded from TOML. Every section has defaults, so an empty file (or no file)
//! yields a working in-memory setup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{Backoff, RetryPolicy};

pub const DEFAULT_CONFIG_FILE: &str = "switchyard.toml";
pub const DEFAULT_EXTERNAL_TAG: &str = "external-integration";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub classifier: ClassifierConfig,
    pub router: RouterSettings,
    pub queue: QueueConfig,
    pub workflow: WorkflowConfig,
    pub integration: IntegrationConfig,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Tags that route a task to the external integration backend.
    pub external_integration_tags: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            external_integration_tags: vec![DEFAULT_EXTERNAL_TAG.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Submission attempts for tasks without a retry policy.
    pub default_max_attempts: u32,
    pub default_backoff: Backoff,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            default_max_attempts: 3,
            default_backoff: Backoff::exponential(200),
        }
    }
}

impl RouterSettings {
    pub fn default_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.default_max_attempts, self.default_backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub default_list: String,
    /// Lists the queue accepts. A task hinting at any other list is rejected.
    pub lists: Vec<String>,
    /// Size of the in-process worker pool.
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_list: "default".to_string(),
            lists: vec!["default".to_string()],
            workers: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub task_list: String,
    /// Workflow ids are `{id_prefix}{task_id}`.
    pub id_prefix: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            task_list: "migration-workflows".to_string(),
            id_prefix: "wf-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    pub default_endpoint: String,
    /// automation name -> endpoint identifier
    pub endpoints: BTreeMap<String, String>,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            default_endpoint: "automation-hub".to_string(),
            endpoints: BTreeMap::new(),
        }
    }
}

impl IntegrationConfig {
    pub fn endpoint_for(&self, automation: &str) -> &str {
        self.endpoints
            .get(automation)
            .map(String::as_str)
            .unwrap_or(&self.default_endpoint)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Terminal entries older than this are evicted.
    pub eviction_max_age_secs: u64,
    pub eviction_interval_secs: u64,
    pub snapshot_path: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            eviction_max_age_secs: 24 * 60 * 60,
            eviction_interval_secs: 5 * 60,
            snapshot_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl RouterConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: RouterConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg: RouterConfig = toml::from_str(&s)?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// `./switchyard.toml` if present, otherwise defaults. Env overrides apply either way.
    pub fn load_default() -> Result<Self, ConfigError> {
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::load(local);
        }
        let mut cfg = RouterConfig::default();
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SWITCHYARD_LOG")
            && !v.trim().is_empty()
        {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("SWITCHYARD_EXTERNAL_TAGS")
            && !v.trim().is_empty()
        {
            self.classifier.external_integration_tags = v
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Ok(v) = std::env::var("SWITCHYARD_QUEUE_DEFAULT_LIST")
            && !v.trim().is_empty()
        {
            let v = v.trim().to_string();
            if !self.queue.lists.contains(&v) {
                self.queue.lists.push(v.clone());
            }
            self.queue.default_list = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.router.default_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "router.default_max_attempts must be at least 1".into(),
            ));
        }
        if self.queue.default_list.trim().is_empty() {
            return Err(ConfigError::Invalid("queue.default_list must not be empty".into()));
        }
        if !self.queue.lists.contains(&self.queue.default_list) {
            return Err(ConfigError::Invalid(format!(
                "queue.default_list '{}' is not one of queue.lists",
                self.queue.default_list
            )));
        }
        if self.workflow.task_list.trim().is_empty() {
            return Err(ConfigError::Invalid("workflow.task_list must not be empty".into()));
        }
        Ok(())
    }
}
