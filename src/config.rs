//! Orchestrator configuration loaded from YAML.

use crate::domain::{OrchestratorError, OrchestratorResult, ProfileId};
use crate::driver::{CliDriver, CliDriverConfig, DriverFactory, SharedDriver};
use crate::orchestrator::OrchestratorSettings;
use crate::pipelines::builtin_registry;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CONFIG_YAML: &str = include_str!("../orchestrator.yaml");

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// Overrides the data directory. Defaults to `~/.worktree-orchestrator/`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Review passes allowed per task (or per change, for single-shot plans).
    #[serde(default = "default_max_review_passes")]
    pub max_review_passes: u32,
    #[serde(default = "default_driver_timeout_secs")]
    pub driver_timeout_secs: u64,
    /// How long `cancel` waits for a task to stop before aborting it.
    #[serde(default = "default_cancel_grace_secs")]
    pub cancel_grace_secs: u64,
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    #[serde(default = "default_profile_name")]
    pub default_profile: String,
    pub profiles: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProfileConfig {
    pub driver: CliDriverConfig,
    #[serde(default)]
    pub default_pipeline: Option<String>,
}

fn default_max_review_passes() -> u32 {
    3
}

fn default_driver_timeout_secs() -> u64 {
    1800
}

fn default_cancel_grace_secs() -> u64 {
    10
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_profile_name() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one profile must be configured")]
    NoProfiles,

    #[error("default profile '{0}' not found in profiles")]
    UnknownDefaultProfile(String),

    #[error("profile '{0}' has an empty driver command")]
    EmptyCommand(String),

    #[error("profile '{profile}' names unknown pipeline '{pipeline}'")]
    UnknownPipeline { profile: String, pipeline: String },

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },
}

impl OrchestratorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise the built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Self::default_config()
        }
    }

    pub fn default_config() -> Result<Self> {
        let config: Self = serde_yaml::from_str(DEFAULT_CONFIG_YAML)
            .context("Failed to parse embedded orchestrator.yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profiles.is_empty() {
            return Err(ConfigError::NoProfiles);
        }
        if !self.profiles.contains_key(&self.default_profile) {
            return Err(ConfigError::UnknownDefaultProfile(self.default_profile.clone()));
        }
        if self.max_review_passes == 0 {
            return Err(ConfigError::Zero {
                field: "max_review_passes",
            });
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "event_channel_capacity",
            });
        }
        if self.driver_timeout_secs == 0 {
            return Err(ConfigError::Zero {
                field: "driver_timeout_secs",
            });
        }

        for (name, profile) in &self.profiles {
            if profile.driver.command.trim().is_empty() {
                return Err(ConfigError::EmptyCommand(name.clone()));
            }
            if let Some(pipeline) = &profile.default_pipeline {
                if !builtin_registry().contains(pipeline) {
                    return Err(ConfigError::UnknownPipeline {
                        profile: name.clone(),
                        pipeline: pipeline.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            max_review_passes: self.max_review_passes,
            driver_timeout: Duration::from_secs(self.driver_timeout_secs),
            cancel_grace: Duration::from_secs(self.cancel_grace_secs),
            event_channel_capacity: self.event_channel_capacity,
        }
    }

    /// Pipeline a profile runs when the caller does not name one.
    pub fn default_pipeline_for(&self, profile: &str) -> Option<&str> {
        self.profiles
            .get(profile)
            .and_then(|p| p.default_pipeline.as_deref())
    }
}

/// One [`CliDriver`] per configured profile.
pub struct ProfileDriverFactory {
    drivers: HashMap<ProfileId, SharedDriver>,
}

impl ProfileDriverFactory {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        let drivers = config
            .profiles
            .iter()
            .map(|(name, profile)| {
                let driver: SharedDriver = Arc::new(CliDriver::new(profile.driver.clone()));
                (ProfileId::from(name.as_str()), driver)
            })
            .collect();
        Self { drivers }
    }
}

impl DriverFactory for ProfileDriverFactory {
    fn driver_for(&self, profile: &ProfileId) -> OrchestratorResult<SharedDriver> {
        self.drivers
            .get(profile)
            .cloned()
            .ok_or_else(|| OrchestratorError::Configuration(format!("unknown profile '{}'", profile)))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
