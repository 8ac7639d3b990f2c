//! Run configuration
//!
//! One TOML file describes the ordered stage chain plus the loop, lock and
//! agent settings. Loaded once at startup and treated as immutable for the
//! run.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::models::ChainStage;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeftConfig {
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub lock: LockSettings,
    #[serde(default)]
    pub agents: AgentSettings,
    #[serde(rename = "stage", default)]
    pub stages: Vec<ChainStage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub max_iterations: u32,
    pub check_all_resolved: bool,
    pub exit_on_all_resolved: bool,
    pub poll_interval_ms: u64,
    pub deadline_secs: u64,
    pub tail_lines: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            check_all_resolved: true,
            exit_on_all_resolved: true,
            poll_interval_ms: 2000,
            deadline_secs: 3600,
            tail_lines: 400,
        }
    }
}

impl RunSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    pub cooldown_ms: u64,
    pub force_release_after_secs: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            cooldown_ms: 3000,
            force_release_after_secs: 300,
        }
    }
}

impl LockSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn force_release_after(&self) -> Duration {
        Duration::from_secs(self.force_release_after_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// tmux target of the pane running the code-fixing agent. This pane is
    /// also the watched stream.
    pub fixer_target: String,
    /// tmux target of the analysis agent pane. Falls back to the fixer pane
    /// when absent.
    pub analysis_target: Option<String>,
    /// Checklist file consulted by the resolution probe.
    pub work_items: PathBuf,
    /// Lines of fixer output included when forwarding a response.
    pub forward_tail_lines: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            fixer_target: "weft:0".to_string(),
            analysis_target: None,
            work_items: PathBuf::from("WORK_ITEMS.md"),
            forward_tail_lines: 40,
        }
    }
}

impl WeftConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: WeftConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [[stage]] is required".to_string(),
            ));
        }
        if self.run.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "run.max_iterations must be at least 1".to_string(),
            ));
        }
        let names: Vec<&str> = self.stages.iter().map(|s| s.name.as_str()).collect();
        for (idx, stage) in self.stages.iter().enumerate() {
            if stage.keyword.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "stage '{}' has an empty keyword",
                    stage.name
                )));
            }
            if names[..idx].contains(&stage.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
            if let Some(next) = &stage.next_stage {
                if !names.contains(&next.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "stage '{}' points at unknown next_stage '{}'",
                        stage.name, next
                    )));
                }
            }
        }
        Ok(())
    }
}
