use nyuki_config::ConfigError;
use nyuki_engine::{EngineError, Transition};
use nyuki_workflow::WorkflowError;

use crate::registry::Lifecycle;

/// Errors raised by the workflow service.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
  /// An event or request referenced an instance that is not registered.
  #[error("unknown workflow instance '{0}'")]
  UnknownInstance(String),

  /// An instance with this identifier is already registered.
  #[error("workflow instance '{0}' is already registered")]
  DuplicateInstance(String),

  /// A lifecycle event arrived out of order.
  #[error("workflow instance '{exec_id}' cannot {transition} while {state}")]
  InvalidTransition {
    exec_id: String,
    transition: Transition,
    state: Lifecycle,
  },

  /// A stored template is structurally invalid.
  #[error("invalid template '{template_id}': {source}")]
  InvalidTemplate {
    template_id: String,
    #[source]
    source: WorkflowError,
  },

  /// The engine refused a template.
  #[error("failed to load template '{template_id}': {source}")]
  TemplateLoad {
    template_id: String,
    #[source]
    source: EngineError,
  },

  /// A finished instance could not be recorded.
  #[error("failed to record history of workflow instance '{exec_id}': {source}")]
  History {
    exec_id: String,
    #[source]
    source: nyuki_store::Error,
  },

  #[error("inbound bus error: {0}")]
  Bus(String),

  #[error("storage error: {0}")]
  Store(#[from] nyuki_store::Error),

  #[error("engine error: {0}")]
  Engine(#[from] EngineError),

  #[error("configuration error: {0}")]
  Config(#[from] ConfigError),

  /// The service loop is not running.
  #[error("workflow service stopped")]
  Stopped,
}
