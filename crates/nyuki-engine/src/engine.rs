use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use nyuki_workflow::{LiveReport, Template, TemplateRef, Value};

use crate::events::ExecutionNotifier;

/// Errors returned by an execution engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// The engine refused a template definition.
  #[error("failed to load template '{template_id}': {message}")]
  Load {
    template_id: String,
    message: String,
  },

  /// The template is not loaded in the engine.
  #[error("template '{0}' is not loaded")]
  TemplateNotLoaded(String),

  /// Starting instances from a payload failed.
  #[error("failed to start workflow: {0}")]
  Trigger(String),

  /// The engine has been stopped.
  #[error("engine stopped")]
  Stopped,
}

/// One in-progress execution of a template, owned by the engine.
///
/// The workflow service holds a shared reference and only ever reads from it.
pub trait Instance: Send + Sync + fmt::Debug {
  /// Unique instance identifier.
  fn id(&self) -> &str;

  /// Identifier of the template this instance runs.
  fn template_id(&self) -> &str;

  /// Current execution state.
  fn report(&self) -> LiveReport;
}

/// The execution engine that schedules and runs workflow tasks.
#[async_trait]
pub trait Engine: Send + Sync {
  /// Make a template available for execution.
  async fn load(&self, template: Template) -> Result<(), EngineError>;

  /// Templates whose trigger predicate matches `topic`.
  fn select(&self, topic: &str) -> Vec<TemplateRef>;

  /// Feed an inbound event to the engine; returns the instances it started.
  async fn data_received(
    &self,
    payload: Value,
    topic: &str,
  ) -> Result<Vec<Arc<dyn Instance>>, EngineError>;

  /// Start one instance of a loaded template with the given payload.
  async fn run_once(
    &self,
    template_id: &str,
    payload: Value,
  ) -> Result<Arc<dyn Instance>, EngineError>;

  /// Receive lifecycle events for every instance the engine runs.
  fn register_notifier(&self, notifier: Arc<dyn ExecutionNotifier>);

  /// Stop executing. Running instances are abandoned.
  async fn stop(&self);
}
