use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use nyuki_cache::CacheSync;
use nyuki_workflow::Report;
use tokio::task::JoinHandle;

use crate::fanout::FanOut;
use crate::global::GlobalBroadcaster;
use crate::history::HistoryRecorder;

/// Everything an instance's state is mirrored to.
///
/// Cache actions of one instance run in dispatch order: each waits for the
/// previous one before touching the cache.
pub struct Sinks {
  /// `None` when no cache is configured or it could not be reached.
  pub cache: Option<CacheSync>,
  pub history: HistoryRecorder,
  pub global: GlobalBroadcaster,
  pub fanout: FanOut,
  cache_lanes: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Sinks {
  pub fn new(cache: Option<CacheSync>, history: HistoryRecorder, global: GlobalBroadcaster) -> Self {
    Self {
      cache,
      history,
      global,
      fanout: FanOut::new(),
      cache_lanes: Mutex::new(HashMap::new()),
    }
  }

  /// Dispatch a cache write of `report`, if the cache is enabled.
  pub fn share(&self, report: Report, replace: bool) {
    let Some(exec_id) = report.exec_id().map(str::to_string) else {
      // Without an id there is no key; `share` logs it
      if let Some(cache) = self.cache.clone() {
        self.fanout.spawn("cache.share", async move {
          cache.share(&report, replace).await;
        });
      }
      return;
    };

    self.enqueue_cache("cache.share", &exec_id, false, move |cache| async move {
      cache.share(&report, replace).await;
    });
  }

  /// Dispatch the final cache write of `report` followed by its deletion.
  ///
  /// Runs after every earlier cache action of the instance, so nothing
  /// recreates the entry afterwards.
  pub fn share_and_forget(&self, exec_id: String, report: Report) {
    let lane = exec_id.clone();
    self.enqueue_cache("cache.forget", &lane, true, move |cache| async move {
      cache.share(&report, true).await;
      cache.forget(&exec_id).await;
    });
  }

  /// Number of instances with cache actions still chained.
  pub fn cache_lanes(&self) -> usize {
    self
      .cache_lanes
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  fn enqueue_cache<F, Fut>(&self, action: &'static str, exec_id: &str, last: bool, make: F)
  where
    F: FnOnce(CacheSync) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let Some(cache) = self.cache.clone() else {
      return;
    };

    let mut lanes = self
      .cache_lanes
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    let previous = lanes.remove(exec_id);
    let write = make(cache);
    let handle = self.fanout.spawn(action, async move {
      if let Some(previous) = previous {
        // A panicked predecessor must not block the rest of the lane
        let _ = previous.await;
      }
      write.await;
    });
    if !last {
      lanes.insert(exec_id.to_string(), handle);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use std::time::Duration;

  use async_trait::async_trait;
  use nyuki_cache::{Cache, CacheError, MemoryCache, SetMode};
  use nyuki_store::MemoryStore;
  use nyuki_workflow::{Map, Value};

  use crate::reporting::LogReporter;

  /// Delays create-only writes, so they would land after a later delete
  /// if nothing ordered them.
  struct SlowCreates {
    inner: MemoryCache,
  }

  #[async_trait]
  impl Cache for SlowCreates {
    async fn set(
      &self,
      key: &str,
      value: String,
      ttl: Duration,
      mode: SetMode,
    ) -> Result<bool, CacheError> {
      if mode == SetMode::IfAbsent {
        tokio::time::sleep(Duration::from_millis(100)).await;
      }
      self.inner.set(key, value, ttl, mode).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
      self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
      self.inner.delete(key).await
    }

    async fn close(&self) {
      self.inner.close().await;
    }
  }

  fn report(exec_id: &str, state: &str) -> Report {
    let mut exec = Map::new();
    exec.insert("id".to_string(), Value::from(exec_id));
    exec.insert("state".to_string(), Value::from(state));
    let mut map = Map::new();
    map.insert("id".to_string(), Value::from("tpl1"));
    map.insert("exec".to_string(), Value::Mapping(exec));
    Report::from_map(map)
  }

  #[tokio::test(start_paused = true)]
  async fn test_registration_write_cannot_outlive_terminal_delete() {
    let cache = Arc::new(SlowCreates {
      inner: MemoryCache::new(),
    });
    let sinks = Sinks::new(
      Some(CacheSync::new("acme", cache.clone())),
      HistoryRecorder::new(Arc::new(MemoryStore::new()), Arc::new(LogReporter)),
      GlobalBroadcaster::new(8),
    );

    sinks.share(report("abc", "pending"), false);
    sinks.share_and_forget("abc".to_string(), report("abc", "end"));
    sinks.fanout.wait_idle().await;

    assert!(cache.inner.keys().await.is_empty());
    assert_eq!(sinks.cache_lanes(), 0);
  }

  #[tokio::test]
  async fn test_lanes_are_per_instance() {
    let cache = Arc::new(MemoryCache::new());
    let sinks = Sinks::new(
      Some(CacheSync::new("acme", cache.clone())),
      HistoryRecorder::new(Arc::new(MemoryStore::new()), Arc::new(LogReporter)),
      GlobalBroadcaster::new(8),
    );

    sinks.share(report("abc", "pending"), false);
    sinks.share(report("def", "pending"), false);
    sinks.share(report("def", "begin"), true);
    sinks.share_and_forget("abc".to_string(), report("abc", "end"));
    sinks.fanout.wait_idle().await;

    assert_eq!(cache.keys().await, vec!["acme.workflows.instances.def"]);
    let cached = cache.get("acme.workflows.instances.def").await.unwrap().unwrap();
    assert!(cached.contains("\"begin\""));
    assert_eq!(sinks.cache_lanes(), 1);
  }

  #[tokio::test]
  async fn test_no_cache_no_lanes() {
    let sinks = Sinks::new(
      None,
      HistoryRecorder::new(Arc::new(MemoryStore::new()), Arc::new(LogReporter)),
      GlobalBroadcaster::new(8),
    );
    sinks.share(report("abc", "pending"), false);
    sinks.share_and_forget("abc".to_string(), report("abc", "end"));
    assert_eq!(sinks.fanout.in_flight(), 0);
    assert_eq!(sinks.cache_lanes(), 0);
  }
}
