use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nyuki_config::CacheConfig;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  #[error("cache client is closed")]
  Closed,

  #[error("cache unreachable: {0}")]
  Unreachable(String),

  #[error("failed to serialize cache value: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Write mode for [`Cache::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
  /// Overwrite any existing value.
  Always,
  /// Only write when the key does not exist.
  IfAbsent,
}

/// Key/value store with per-key expiration.
#[async_trait]
pub trait Cache: Send + Sync {
  /// Store `value` under `key`. Returns whether the value was written.
  async fn set(
    &self,
    key: &str,
    value: String,
    ttl: Duration,
    mode: SetMode,
  ) -> Result<bool, CacheError>;

  async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

  /// Returns whether a value was deleted.
  async fn delete(&self, key: &str) -> Result<bool, CacheError>;

  /// Release the connection. Later calls fail with [`CacheError::Closed`].
  async fn close(&self);
}

/// Opens cache clients.
#[async_trait]
pub trait CacheConnector: Send + Sync {
  async fn connect(&self, config: &CacheConfig) -> Result<Arc<dyn Cache>, CacheError>;
}
