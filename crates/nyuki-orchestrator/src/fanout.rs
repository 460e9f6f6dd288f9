use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Executor for fire-and-forget sink actions.
///
/// Dispatched actions run concurrently; their completion order relative to
/// each other and to later events is unspecified. Nothing waits for them
/// during normal operation, and shutdown does not cancel them.
#[derive(Debug, Clone, Default)]
pub struct FanOut {
  tracker: TaskTracker,
  // Held for the whole close/wait/reopen cycle of `wait_idle`
  draining: Arc<Mutex<()>>,
}

impl FanOut {
  pub fn new() -> Self {
    Self::default()
  }

  /// Dispatch an action. Must be called from within a tokio runtime.
  pub fn spawn<F>(&self, action: &'static str, future: F) -> JoinHandle<()>
  where
    F: Future<Output = ()> + Send + 'static,
  {
    debug!(action, "dispatching fan-out action");
    self.tracker.spawn(future)
  }

  /// Number of actions still running.
  pub fn in_flight(&self) -> usize {
    self.tracker.len()
  }

  /// Wait until every dispatched action has finished.
  ///
  /// Concurrent callers are served one after the other.
  pub async fn wait_idle(&self) {
    let _draining = self.draining.lock().await;
    self.tracker.close();
    self.tracker.wait().await;
    self.tracker.reopen();
  }
}
