//! Configuration management
//!
//! Manages engine configuration: model assignments per role, retry policy,
//! and the playbook section layout. Stored as TOML in the platform config
//! directory, defaults applied field by field.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model assignments for the three roles
    #[serde(default)]
    pub models: ModelsConfig,
    /// Retry policy shared by the roles
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Reflector refinement settings
    #[serde(default)]
    pub reflection: ReflectionConfig,
    /// Playbook layout
    #[serde(default)]
    pub playbook: PlaybookConfig,
}

/// Model assignments for the pipeline roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Model for answer generation
    #[serde(default = "default_generator_model")]
    pub generator: String,
    /// Model for critique
    #[serde(default = "default_reflector_model")]
    pub reflector: String,
    /// Model for knowledge curation
    #[serde(default = "default_curator_model")]
    pub curator: String,
}

fn default_generator_model() -> String {
    "meta-llama/llama-3.1-8b-instruct".to_string()
}

fn default_reflector_model() -> String {
    "deepseek/deepseek-r1".to_string()
}

fn default_curator_model() -> String {
    "deepseek/deepseek-r1".to_string()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            generator: default_generator_model(),
            reflector: default_reflector_model(),
            curator: default_curator_model(),
        }
    }
}

/// Bounded retry policy for model calls.
///
/// The default is the engine's documented behavior: immediate retries, no
/// backoff. Callers that need hardening raise `backoff_ms`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: 0,
        }
    }
}

impl RetryPolicy {
    /// Sleep before a retry attempt when a backoff is configured. The first
    /// attempt never pauses.
    pub(crate) async fn pause_before(&self, attempt: u32) {
        if attempt > 1 && self.backoff_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.backoff_ms)).await;
        }
    }
}

/// Reflector refinement settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReflectionConfig {
    /// Outer refinement rounds; each round gets a full retry budget.
    #[serde(default = "default_refinement_rounds")]
    pub max_refinement_rounds: u32,
}

fn default_refinement_rounds() -> u32 {
    1
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            max_refinement_rounds: default_refinement_rounds(),
        }
    }
}

/// Playbook layout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookConfig {
    /// Ordered section names for new playbooks.
    #[serde(default = "default_sections")]
    pub sections: Vec<String>,
}

fn default_sections() -> Vec<String> {
    crate::playbook::DEFAULT_SECTIONS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for PlaybookConfig {
    fn default() -> Self {
        Self {
            sections: default_sections(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating the default file on first run.
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "playbook-engine", "playbook-engine")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path (persisted playbook lives here)
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "playbook-engine", "playbook-engine")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}
