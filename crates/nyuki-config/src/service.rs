use std::path::Path;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read config file '{path}': {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("invalid config: {0}")]
  Invalid(String),
}

/// Configuration of one workflow service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
  /// Name this service is addressed by on the bus, used in `nyuki://` URIs.
  pub holder: String,

  /// Service name, used to namespace cache keys.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub service: Option<String>,

  pub storage: StorageConfig,

  /// Inbound topics that may trigger workflows.
  #[serde(default)]
  pub topics: Vec<String>,

  /// Ephemeral report cache. Absent means disabled.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cache: Option<CacheConfig>,

  /// Capacity of each live-subscriber channel.
  #[serde(default = "default_channel_capacity")]
  pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
  DEFAULT_CHANNEL_CAPACITY
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
  /// Database URL, e.g. `sqlite://nyuki.db` or `sqlite::memory:`.
  pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
  #[serde(default)]
  pub backend: CacheBackend,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
  #[default]
  Memory,
}

/// How the cache section resolves once the rest of the config is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheSetting {
  Disabled,
  /// A cache is configured but there is no service name to namespace it.
  MissingNamespace,
  Enabled {
    namespace: String,
    config: CacheConfig,
  },
}

impl ServiceConfig {
  /// Read, parse and validate a JSON config file.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_json(&content)
  }

  /// Parse and validate a JSON config.
  pub fn from_json(content: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if !is_name(&self.holder) {
      return Err(ConfigError::Invalid(format!(
        "holder '{}' must be a non-empty word ([A-Za-z0-9_-])",
        self.holder
      )));
    }
    if self.storage.url.trim().is_empty() {
      return Err(ConfigError::Invalid("storage.url is empty".to_string()));
    }
    if self.topics.iter().any(|topic| topic.trim().is_empty()) {
      return Err(ConfigError::Invalid("topics must not be empty".to_string()));
    }
    if self.channel_capacity == 0 {
      return Err(ConfigError::Invalid(
        "channel_capacity must be at least 1".to_string(),
      ));
    }
    Ok(())
  }

  pub fn cache_setting(&self) -> CacheSetting {
    let Some(config) = &self.cache else {
      return CacheSetting::Disabled;
    };
    match &self.service {
      Some(namespace) if !namespace.is_empty() => CacheSetting::Enabled {
        namespace: namespace.clone(),
        config: config.clone(),
      },
      _ => {
        tracing::error!("cache is configured but no service name is set, cache disabled");
        CacheSetting::MissingNamespace
      }
    }
  }
}

fn is_name(value: &str) -> bool {
  !value.is_empty()
    && value
      .chars()
      .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
  use super::*;

  const MINIMAL: &str = r#"{"holder": "workflow", "storage": {"url": "sqlite::memory:"}}"#;

  #[test]
  fn test_minimal_config() {
    let config = ServiceConfig::from_json(MINIMAL).unwrap();
    assert_eq!(config.holder, "workflow");
    assert!(config.topics.is_empty());
    assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    assert_eq!(config.cache_setting(), CacheSetting::Disabled);
  }

  #[test]
  fn test_cache_enabled() {
    let config = ServiceConfig::from_json(
      r#"{
        "holder": "workflow",
        "service": "acme",
        "storage": {"url": "sqlite::memory:"},
        "topics": ["alerts"],
        "cache": {"backend": "memory"}
      }"#,
    )
    .unwrap();

    assert_eq!(
      config.cache_setting(),
      CacheSetting::Enabled {
        namespace: "acme".to_string(),
        config: CacheConfig {
          backend: CacheBackend::Memory
        },
      }
    );
  }

  #[test]
  fn test_cache_without_service() {
    let config = ServiceConfig::from_json(
      r#"{"holder": "workflow", "storage": {"url": "x"}, "cache": {}}"#,
    )
    .unwrap();
    assert_eq!(config.cache_setting(), CacheSetting::MissingNamespace);
  }

  #[test]
  fn test_invalid_configs() {
    for content in [
      r#"{"holder": "bad holder", "storage": {"url": "x"}}"#,
      r#"{"holder": "workflow", "storage": {"url": " "}}"#,
      r#"{"holder": "workflow", "storage": {"url": "x"}, "topics": [""]}"#,
      r#"{"holder": "workflow", "storage": {"url": "x"}, "channel_capacity": 0}"#,
    ] {
      assert!(
        matches!(ServiceConfig::from_json(content), Err(ConfigError::Invalid(_))),
        "{content} should be invalid"
      );
    }
  }

  #[test]
  fn test_missing_storage() {
    let result = ServiceConfig::from_json(r#"{"holder": "workflow"}"#);
    assert!(matches!(result, Err(ConfigError::Parse(_))));
  }
}
