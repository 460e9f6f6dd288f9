use tracing::error;

use crate::error::OrchestratorError;

/// Diagnostic sink for failures that must not be dropped silently, such as a
/// lost history record or a template the engine refused.
///
/// Reporting is fire-and-forget and never fails.
pub trait ErrorReporter: Send + Sync {
  fn report(&self, error: &OrchestratorError);
}

/// Reports errors to the log.
#[derive(Debug, Clone, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
  fn report(&self, error: &OrchestratorError) {
    error!(error = %error, "workflow service error");
  }
}
