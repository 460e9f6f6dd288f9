use std::sync::Arc;

use nyuki_engine::Engine;
use nyuki_store::{Store, TemplateQuery};
use nyuki_workflow::{Document, Template};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::error::OrchestratorError;
use crate::reporting::ErrorReporter;

/// Outcome of a recovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
  pub loaded: Vec<String>,
  pub failed: Vec<String>,
}

/// Loads the published templates into the engine, one at a time.
///
/// A template that fails to load is reported and skipped.
#[derive(Clone)]
pub struct TemplateRecovery {
  store: Arc<dyn Store>,
  engine: Arc<dyn Engine>,
  reporter: Arc<dyn ErrorReporter>,
}

impl TemplateRecovery {
  pub fn new(
    store: Arc<dyn Store>,
    engine: Arc<dyn Engine>,
    reporter: Arc<dyn ErrorReporter>,
  ) -> Self {
    Self {
      store,
      engine,
      reporter,
    }
  }

  pub async fn run(&self) -> Result<RecoveryReport, OrchestratorError> {
    let documents = self.store.list_templates(TemplateQuery::published()).await?;
    let mut report = RecoveryReport::default();

    for document in documents {
      let template_id = document
        .get("id")
        .and_then(JsonValue::as_str)
        .unwrap_or("<unknown>")
        .to_string();

      match self.load(&template_id, document).await {
        Ok(()) => report.loaded.push(template_id),
        Err(e) => {
          self.reporter.report(&e);
          report.failed.push(template_id);
        }
      }
    }

    info!(
      loaded = report.loaded.len(),
      failed = report.failed.len(),
      "templates recovered"
    );
    Ok(report)
  }

  async fn load(&self, template_id: &str, document: Document) -> Result<(), OrchestratorError> {
    let template =
      Template::from_map(document).map_err(|source| OrchestratorError::InvalidTemplate {
        template_id: template_id.to_string(),
        source,
      })?;

    self
      .engine
      .load(template)
      .await
      .map_err(|source| OrchestratorError::TemplateLoad {
        template_id: template_id.to_string(),
        source,
      })
  }
}
