// Runtime configuration for the submission pipeline
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::language::Language;

pub const DEFAULT_CONFIG_PATH: &str = "config/runlab.json";
pub const DEFAULT_SANDBOX_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub size: usize,
    pub interval_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: 5,
            interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    pub enabled: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunlabConfig {
    pub sandbox_url: String,
    pub bind_addr: String,
    /// Fixed timeout for each individual test execution.
    pub test_timeout_ms: u64,
    pub history_capacity: usize,
    pub batch: BatchConfig,
    pub validation: ValidationConfig,
    /// Explicit session -> language name assignments.
    pub sessions: HashMap<String, String>,
}

impl Default for RunlabConfig {
    fn default() -> Self {
        Self {
            sandbox_url: DEFAULT_SANDBOX_URL.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            test_timeout_ms: 5000,
            history_capacity: 50,
            batch: BatchConfig::default(),
            validation: ValidationConfig::default(),
            sessions: HashMap::new(),
        }
    }
}

impl RunlabConfig {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: RunlabConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load config/runlab.json if present, otherwise defaults, then apply
    /// environment overrides.
    pub fn load_default() -> Result<Self> {
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        let mut config = if default_path.exists() {
            Self::load(default_path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("RUNLAB_SANDBOX_URL") {
            self.sandbox_url = url;
        }
        if let Ok(addr) = std::env::var("RUNLAB_BIND_ADDR") {
            self.bind_addr = addr;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.batch.size == 0 {
            bail!("batch.size must be at least 1");
        }
        if self.batch.interval_ms == 0 {
            bail!("batch.interval_ms must be at least 1");
        }
        if self.history_capacity == 0 {
            bail!("history_capacity must be at least 1");
        }
        Ok(())
    }

    /// Parsed per-session language assignments
    pub fn session_languages(&self) -> HashMap<String, Language> {
        self.sessions
            .iter()
            .map(|(session, name)| (session.clone(), Language::from_name(name)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RunlabConfig =
            serde_json::from_str(r#"{"batch": {"size": 3}, "sessions": {"s1": "python"}}"#).unwrap();
        assert_eq!(config.batch.size, 3);
        assert_eq!(config.batch.interval_ms, 1000);
        assert_eq!(config.test_timeout_ms, 5000);
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.session_languages().get("s1"), Some(&Language::Python));
    }

    #[test]
    fn test_load_missing_file() {
        let result = RunlabConfig::load(Path::new("does/not/exist.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = RunlabConfig::default();
        config.batch.size = 0;
        assert!(config.validate().is_err());
    }
}
