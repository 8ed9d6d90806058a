//! Store configuration, read from `.rmap/config.yaml`.

use crate::id::{DEFAULT_ID_LENGTH, DEFAULT_PREFIX};
use crate::types::Iri;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default topic name for published events.
pub const DEFAULT_TOPIC: &str = "rmap-event-topic";

/// Default bound on waiting for the publication sink.
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 30_000;

/// Configuration for a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent allowed to tombstone and delete any DiSCO.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_agent: Option<Iri>,

    /// Prefix of minted identifiers.
    pub id_prefix: String,

    /// Length of the random part of minted identifiers.
    pub id_length: usize,

    /// Event publication; absent means events are not mirrored anywhere.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            admin_agent: None,
            id_prefix: DEFAULT_PREFIX.to_string(),
            id_length: DEFAULT_ID_LENGTH,
            publish: None,
        }
    }
}

/// Where and how events are mirrored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub topic: String,
    pub timeout_ms: u64,
    /// Append events to this JSONL file. Relative paths resolve against `.rmap/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsonl_path: Option<PathBuf>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            timeout_ms: DEFAULT_PUBLISH_TIMEOUT_MS,
            jsonl_path: None,
        }
    }
}

impl PublishConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Parse a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Failed to parse config YAML")
    }

    /// Load from a file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&text)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn with_admin_agent(mut self, agent: impl Into<Iri>) -> Self {
        self.admin_agent = Some(agent.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.id_prefix, "rmap:");
        assert!(config.publish.is_none());
    }

    #[test]
    fn test_partial_publish_section() {
        let config = Config::from_yaml("admin_agent: rmap:admin\npublish:\n  topic: events\n").unwrap();
        assert_eq!(config.admin_agent, Some(Iri::new("rmap:admin")));
        let publish = config.publish.unwrap();
        assert_eq!(publish.topic, "events");
        assert_eq!(publish.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("config.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let config = Config::default().with_admin_agent("rmap:admin");
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(Config::from_yaml("id_length: [not a number]").is_err());
    }
}
