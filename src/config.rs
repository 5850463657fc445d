use crate::shared::ids::DeploymentName;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("settings validation failed: {0}")]
    Settings(String),
    #[error("deploy plan validation failed: {0}")]
    Plan(String),
}

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8680/api/v1";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_TRANSIENT_BUDGET_MS: u64 = 60_000;
pub const DEFAULT_PROGRESS_TICK_MS: u64 = 10;

/// Engine tunables. Values come from `config.yaml` under the state root and
/// may be overridden per-process through `HELMSMAN_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base: String,
    pub poll_interval_ms: u64,
    pub transient_budget_ms: u64,
    pub progress_tick_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            transient_budget_ms: DEFAULT_TRANSIENT_BUDGET_MS,
            progress_tick_ms: DEFAULT_PROGRESS_TICK_MS,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base.trim().is_empty() {
            return Err(ConfigError::Settings("api_base must be non-empty".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Settings(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.transient_budget_ms == 0 {
            return Err(ConfigError::Settings(
                "transient_budget_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(value) = env_string("HELMSMAN_API_BASE") {
            self.api_base = value;
        }
        if let Some(value) = env_millis("HELMSMAN_POLL_INTERVAL_MS") {
            self.poll_interval_ms = value;
        }
        if let Some(value) = env_millis("HELMSMAN_TRANSIENT_BUDGET_MS") {
            self.transient_budget_ms = value;
        }
        if let Some(value) = env_millis("HELMSMAN_PROGRESS_TICK_MS") {
            self.progress_tick_ms = value;
        }
        self
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_millis(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
}

/// Loads settings from `path`; a missing file yields the defaults so a fresh
/// state root works without any configuration step.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let settings: Settings = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    settings.validate()?;
    Ok(settings)
}

/// The operator-reviewed deployment: its name plus the opaque configuration
/// body that gets submitted to the server verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployPlan {
    pub name: DeploymentName,
    #[serde(default)]
    pub api_base: Option<String>,
    pub config: serde_json::Value,
}

pub fn load_deploy_plan(path: &Path) -> Result<DeployPlan, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let plan: DeployPlan = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    if !plan.config.is_object() {
        return Err(ConfigError::Plan(
            "config must be a mapping of component sections".into(),
        ));
    }
    Ok(plan)
}
