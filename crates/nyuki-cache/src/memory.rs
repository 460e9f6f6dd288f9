use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use nyuki_config::{CacheBackend, CacheConfig};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::cache::{Cache, CacheConnector, CacheError, SetMode};

struct Entry {
  value: String,
  expires_at: Instant,
}

/// In-process cache with lazy expiration.
#[derive(Default)]
pub struct MemoryCache {
  entries: Mutex<HashMap<String, Entry>>,
  closed: AtomicBool,
}

impl MemoryCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::SeqCst)
  }

  /// Remaining time to live of a key, if present.
  pub async fn ttl(&self, key: &str) -> Option<Duration> {
    let now = Instant::now();
    let entries = self.entries.lock().await;
    entries
      .get(key)
      .filter(|entry| entry.expires_at > now)
      .map(|entry| entry.expires_at - now)
  }

  pub async fn keys(&self) -> Vec<String> {
    let now = Instant::now();
    let entries = self.entries.lock().await;
    let mut keys: Vec<String> = entries
      .iter()
      .filter(|(_, entry)| entry.expires_at > now)
      .map(|(key, _)| key.clone())
      .collect();
    keys.sort();
    keys
  }

  fn check_open(&self) -> Result<(), CacheError> {
    if self.is_closed() {
      return Err(CacheError::Closed);
    }
    Ok(())
  }
}

#[async_trait]
impl Cache for MemoryCache {
  async fn set(
    &self,
    key: &str,
    value: String,
    ttl: Duration,
    mode: SetMode,
  ) -> Result<bool, CacheError> {
    self.check_open()?;
    let now = Instant::now();
    let mut entries = self.entries.lock().await;

    let exists = entries.get(key).is_some_and(|entry| entry.expires_at > now);
    if exists && mode == SetMode::IfAbsent {
      return Ok(false);
    }

    entries.insert(
      key.to_string(),
      Entry {
        value,
        expires_at: now + ttl,
      },
    );
    Ok(true)
  }

  async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
    self.check_open()?;
    let now = Instant::now();
    let mut entries = self.entries.lock().await;

    match entries.get(key) {
      Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
      Some(_) => {
        entries.remove(key);
        Ok(None)
      }
      None => Ok(None),
    }
  }

  async fn delete(&self, key: &str) -> Result<bool, CacheError> {
    self.check_open()?;
    let now = Instant::now();
    let removed = self.entries.lock().await.remove(key);
    Ok(removed.is_some_and(|entry| entry.expires_at > now))
  }

  async fn close(&self) {
    self.closed.store(true, Ordering::SeqCst);
  }
}

/// Connector for the `memory` backend.
///
/// Every `connect` opens a fresh cache; the most recent one stays reachable
/// through [`MemoryConnector::current`].
#[derive(Default)]
pub struct MemoryConnector {
  current: std::sync::Mutex<Option<Arc<MemoryCache>>>,
}

impl MemoryConnector {
  pub fn new() -> Self {
    Self::default()
  }

  /// The cache opened by the last `connect`.
  pub fn current(&self) -> Option<Arc<MemoryCache>> {
    self
      .current
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }
}

#[async_trait]
impl CacheConnector for MemoryConnector {
  async fn connect(&self, config: &CacheConfig) -> Result<Arc<dyn Cache>, CacheError> {
    match config.backend {
      CacheBackend::Memory => {
        let cache = Arc::new(MemoryCache::new());
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(cache.clone());
        Ok(cache)
      }
    }
  }
}
