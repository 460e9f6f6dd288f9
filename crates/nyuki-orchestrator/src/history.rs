use std::sync::Arc;

use nyuki_store::{HistoryRecord, Store};
use nyuki_workflow::Report;
use tracing::info;

use crate::error::OrchestratorError;
use crate::fanout::FanOut;
use crate::reporting::ErrorReporter;

/// Persists the final report of each finished instance.
#[derive(Clone)]
pub struct HistoryRecorder {
  store: Arc<dyn Store>,
  reporter: Arc<dyn ErrorReporter>,
}

impl HistoryRecorder {
  pub fn new(store: Arc<dyn Store>, reporter: Arc<dyn ErrorReporter>) -> Self {
    Self { store, reporter }
  }

  /// Sanitize a terminal report and dispatch its insert.
  ///
  /// Failures go to the error reporter; inserts are not retried.
  pub fn record(&self, fanout: &FanOut, report: Report) {
    let exec_id = report.exec_id().unwrap_or_default().to_string();
    let record = match HistoryRecord::from_document(report.sanitize().into_document()) {
      Ok(record) => record,
      Err(source) => {
        self
          .reporter
          .report(&OrchestratorError::History { exec_id, source });
        return;
      }
    };

    let store = self.store.clone();
    let reporter = self.reporter.clone();
    fanout.spawn("history.insert", async move {
      match store.insert_instance(record).await {
        Ok(stored_id) => info!(exec_id = %exec_id, stored_id = %stored_id, "workflow recorded"),
        Err(source) => reporter.report(&OrchestratorError::History { exec_id, source }),
      }
    });
  }
}
