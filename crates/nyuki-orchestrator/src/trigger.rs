use std::collections::HashMap;
use std::sync::Arc;

use nyuki_engine::{Engine, Instance};
use nyuki_store::Store;
use nyuki_workflow::{ExecMeta, Template};
use tracing::{debug, info, warn};

use crate::bus::InboundEvent;
use crate::error::OrchestratorError;
use crate::registry::Registry;
use crate::reporting::ErrorReporter;
use crate::sinks::Sinks;

/// Turns inbound events into new workflow instances.
#[derive(Clone)]
pub struct TriggerBinding {
  engine: Arc<dyn Engine>,
  store: Arc<dyn Store>,
  reporter: Arc<dyn ErrorReporter>,
}

impl TriggerBinding {
  pub fn new(
    engine: Arc<dyn Engine>,
    store: Arc<dyn Store>,
    reporter: Arc<dyn ErrorReporter>,
  ) -> Self {
    Self {
      engine,
      store,
      reporter,
    }
  }

  /// Start every template waiting for the event's topic.
  ///
  /// Returns the identifiers of the registered instances.
  pub async fn handle(
    &self,
    registry: &mut Registry,
    sinks: &Sinks,
    event: InboundEvent,
  ) -> Result<Vec<String>, OrchestratorError> {
    let candidates = self.engine.select(&event.topic);
    if candidates.is_empty() {
      debug!(topic = %event.topic, "no template waits for this topic");
      return Ok(Vec::new());
    }

    // A template that cannot be read is skipped; the others still start
    let mut templates = HashMap::new();
    for candidate in candidates {
      match self.template(&candidate.id).await {
        Ok(template) => {
          templates.insert(candidate.id, template);
        }
        Err(e) => self.reporter.report(&e),
      }
    }
    if templates.is_empty() {
      return Ok(Vec::new());
    }

    let instances = self
      .engine
      .data_received(event.payload, &event.topic)
      .await?;

    let mut started = Vec::with_capacity(instances.len());
    for instance in instances {
      let Some(template) = templates.get(instance.template_id()) else {
        warn!(
          exec_id = %instance.id(),
          template_id = %instance.template_id(),
          "engine started an instance of an unselected template"
        );
        continue;
      };
      match register(registry, sinks, template.clone(), instance, ExecMeta::new()) {
        Ok(exec_id) => started.push(exec_id),
        Err(e) => self.reporter.report(&e),
      }
    }

    info!(topic = %event.topic, started = started.len(), "workflows triggered");
    Ok(started)
  }

  /// Read a published template, with its metadata, from storage.
  pub async fn template(&self, template_id: &str) -> Result<Template, OrchestratorError> {
    let document = self.store.get_template(template_id, false, true).await?;
    Template::from_map(document).map_err(|source| OrchestratorError::InvalidTemplate {
      template_id: template_id.to_string(),
      source,
    })
  }
}

/// Register a freshly started instance and mirror its first report.
///
/// The cache write is create-only so it cannot overwrite a terminal snapshot
/// that got there first.
pub(crate) fn register(
  registry: &mut Registry,
  sinks: &Sinks,
  template: Template,
  instance: Arc<dyn Instance>,
  exec: ExecMeta,
) -> Result<String, OrchestratorError> {
  let workflow = registry.create(template, instance, exec)?;
  let exec_id = workflow.id().to_string();
  info!(exec_id = %exec_id, template_id = %workflow.template().id(), "workflow registered");

  sinks.share(workflow.report(), false);
  Ok(exec_id)
}
