use thiserror::Error;

/// A template document that cannot be used as a workflow definition.
#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("template document is not an object")]
  NotAnObject,

  #[error("template is missing required field '{0}'")]
  MissingField(&'static str),

  #[error("template field '{field}' is invalid: {message}")]
  InvalidField {
    field: &'static str,
    message: String,
  },

  #[error("duplicate task id in template: {0}")]
  DuplicateTask(String),

  #[error("invalid template graph: {0}")]
  Graph(String),
}
