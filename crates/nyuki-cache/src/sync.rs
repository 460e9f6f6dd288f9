use std::sync::Arc;
use std::time::Duration;

use nyuki_workflow::Report;
use tracing::{debug, error, warn};

use crate::cache::{Cache, CacheError, SetMode};

/// Expiration of a mirrored report, independent of the instance lifetime.
pub const ENTRY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Mirrors instance reports into a [`Cache`].
#[derive(Clone)]
pub struct CacheSync {
  namespace: String,
  cache: Arc<dyn Cache>,
}

impl CacheSync {
  pub fn new(namespace: impl Into<String>, cache: Arc<dyn Cache>) -> Self {
    Self {
      namespace: namespace.into(),
      cache,
    }
  }

  pub fn namespace(&self) -> &str {
    &self.namespace
  }

  /// Cache key of an instance's report.
  pub fn key(&self, exec_id: &str) -> String {
    format!("{}.workflows.instances.{}", self.namespace, exec_id)
  }

  /// Write a report snapshot. With `replace` unset the write only happens
  /// when no snapshot exists yet.
  ///
  /// Returns whether the snapshot was written. Failures are logged.
  pub async fn share(&self, report: &Report, replace: bool) -> bool {
    let Some(exec_id) = report.exec_id() else {
      warn!("report has no exec id, not cached");
      return false;
    };

    match self.write(exec_id, report, replace).await {
      Ok(written) => {
        if !written {
          debug!(exec_id = %exec_id, "report already cached, kept existing entry");
        }
        written
      }
      Err(e) => {
        error!(exec_id = %exec_id, error = %e, "failed to cache workflow report");
        false
      }
    }
  }

  async fn write(&self, exec_id: &str, report: &Report, replace: bool) -> Result<bool, CacheError> {
    let value = serde_json::to_string(report)?;
    let mode = if replace {
      SetMode::Always
    } else {
      SetMode::IfAbsent
    };
    self.cache.set(&self.key(exec_id), value, ENTRY_TTL, mode).await
  }

  /// Delete an instance's snapshot. Failures are logged.
  pub async fn forget(&self, exec_id: &str) {
    if let Err(e) = self.cache.delete(&self.key(exec_id)).await {
      error!(exec_id = %exec_id, error = %e, "failed to delete cached workflow report");
    }
  }

  pub async fn close(&self) {
    self.cache.close().await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::memory::MemoryCache;
  use nyuki_workflow::{Map, Value};

  fn report(exec_id: &str, state: &str) -> Report {
    let mut exec = Map::new();
    exec.insert("id".to_string(), Value::from(exec_id));
    exec.insert("state".to_string(), Value::from(state));
    let mut map = Map::new();
    map.insert("id".to_string(), Value::from("tpl1"));
    map.insert("exec".to_string(), Value::Mapping(exec));
    Report::from_map(map)
  }

  fn cached_state(value: &str) -> String {
    let json: serde_json::Value = serde_json::from_str(value).unwrap();
    json["exec"]["state"].as_str().unwrap().to_string()
  }

  #[tokio::test]
  async fn test_key_layout() {
    let sync = CacheSync::new("acme", Arc::new(MemoryCache::new()));
    assert_eq!(sync.key("abc"), "acme.workflows.instances.abc");
  }

  #[tokio::test(start_paused = true)]
  async fn test_share_sets_ttl() {
    let cache = Arc::new(MemoryCache::new());
    let sync = CacheSync::new("acme", cache.clone());

    assert!(sync.share(&report("abc", "begin"), false).await);
    assert_eq!(cache.ttl("acme.workflows.instances.abc").await, Some(ENTRY_TTL));
  }

  #[tokio::test]
  async fn test_create_only_keeps_existing() {
    let cache = Arc::new(MemoryCache::new());
    let sync = CacheSync::new("acme", cache.clone());

    assert!(sync.share(&report("abc", "end"), true).await);
    assert!(!sync.share(&report("abc", "begin"), false).await);

    let value = cache.get("acme.workflows.instances.abc").await.unwrap().unwrap();
    assert_eq!(cached_state(&value), "end");

    assert!(sync.share(&report("abc", "progress"), true).await);
    let value = cache.get("acme.workflows.instances.abc").await.unwrap().unwrap();
    assert_eq!(cached_state(&value), "progress");
  }

  #[tokio::test]
  async fn test_failures_are_swallowed() {
    let cache = Arc::new(MemoryCache::new());
    let sync = CacheSync::new("acme", cache.clone());
    sync.close().await;

    assert!(!sync.share(&report("abc", "begin"), true).await);
    sync.forget("abc").await;
  }

  #[tokio::test]
  async fn test_forget() {
    let cache = Arc::new(MemoryCache::new());
    let sync = CacheSync::new("acme", cache.clone());

    sync.share(&report("abc", "begin"), true).await;
    sync.forget("abc").await;
    assert!(cache.keys().await.is_empty());
  }
}
