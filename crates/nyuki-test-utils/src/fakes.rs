use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nyuki_cache::{Cache, CacheConnector, CacheError};
use nyuki_config::CacheConfig;
use nyuki_orchestrator::{ErrorReporter, OrchestratorError};
use nyuki_store::{Error, HistoryRecord, MemoryStore, Store, TemplateQuery};
use nyuki_workflow::Document;

/// Keeps every reported error, as text.
#[derive(Debug, Default)]
pub struct RecordingReporter {
  errors: Mutex<Vec<String>>,
}

impl RecordingReporter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn errors(&self) -> Vec<String> {
    self.errors.lock().unwrap().clone()
  }

  pub fn count(&self) -> usize {
    self.errors.lock().unwrap().len()
  }
}

impl ErrorReporter for RecordingReporter {
  fn report(&self, error: &OrchestratorError) {
    self.errors.lock().unwrap().push(error.to_string());
  }
}

/// A cache connector whose backend is never reachable.
#[derive(Debug, Default)]
pub struct UnreachableConnector;

#[async_trait]
impl CacheConnector for UnreachableConnector {
  async fn connect(&self, _config: &CacheConfig) -> Result<Arc<dyn Cache>, CacheError> {
    Err(CacheError::Unreachable("connection refused".to_string()))
  }
}

/// An in-memory store whose history inserts can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
  inner: MemoryStore,
  fail_history: AtomicBool,
}

impl FlakyStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn fail_history(&self, fail: bool) {
    self.fail_history.store(fail, Ordering::SeqCst);
  }
}

#[async_trait]
impl Store for FlakyStore {
  async fn get_template(
    &self,
    template_id: &str,
    draft: bool,
    with_metadata: bool,
  ) -> Result<Document, Error> {
    self
      .inner
      .get_template(template_id, draft, with_metadata)
      .await
  }

  async fn list_templates(&self, query: TemplateQuery) -> Result<Vec<Document>, Error> {
    self.inner.list_templates(query).await
  }

  async fn save_draft(&self, template: Document) -> Result<Document, Error> {
    self.inner.save_draft(template).await
  }

  async fn publish_draft(&self, template_id: &str) -> Result<u64, Error> {
    self.inner.publish_draft(template_id).await
  }

  async fn set_metadata(&self, template_id: &str, metadata: Document) -> Result<(), Error> {
    self.inner.set_metadata(template_id, metadata).await
  }

  async fn insert_instance(&self, record: HistoryRecord) -> Result<String, Error> {
    if self.fail_history.load(Ordering::SeqCst) {
      return Err(Error::Invalid("history store unavailable".to_string()));
    }
    self.inner.insert_instance(record).await
  }

  async fn get_instance(&self, exec_id: &str) -> Result<Document, Error> {
    self.inner.get_instance(exec_id).await
  }

  async fn list_instances(&self, limit: u32) -> Result<Vec<HistoryRecord>, Error> {
    self.inner.list_instances(limit).await
  }
}
