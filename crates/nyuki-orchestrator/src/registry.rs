//! Running-instance registry.
//!
//! The registry is the only authority on which instances are active. It is
//! owned by the service loop and mutated from it alone.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use nyuki_channel::{LiveChannel, Subscription};
use nyuki_engine::{Instance, Transition};
use nyuki_workflow::{ExecMeta, Report, Template, Value, WorkflowRef};
use tracing::error;

use crate::error::OrchestratorError;

/// Where an instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  /// Started by the engine, `begin` not seen yet.
  Registered,
  Running,
  Suspended,
}

impl fmt::Display for Lifecycle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = match self {
      Lifecycle::Registered => "registered",
      Lifecycle::Running => "running",
      Lifecycle::Suspended => "suspended",
    };
    f.write_str(state)
  }
}

/// A template and one of its running instances, with caller metadata.
#[derive(Debug)]
pub struct RunningWorkflow {
  template: Template,
  instance: Arc<dyn Instance>,
  exec: ExecMeta,
  lifecycle: Lifecycle,
  channel: LiveChannel,
}

impl RunningWorkflow {
  fn new(
    template: Template,
    instance: Arc<dyn Instance>,
    exec: ExecMeta,
    channel_capacity: usize,
  ) -> Self {
    let channel = LiveChannel::new(
      format!("/workflow/instances/{}", instance.id()),
      channel_capacity,
    );
    Self {
      template,
      instance,
      exec,
      lifecycle: Lifecycle::Registered,
      channel,
    }
  }

  pub fn id(&self) -> &str {
    self.instance.id()
  }

  pub fn template(&self) -> &Template {
    &self.template
  }

  pub fn exec_meta(&self) -> &ExecMeta {
    &self.exec
  }

  pub fn lifecycle(&self) -> Lifecycle {
    self.lifecycle
  }

  pub fn channel(&self) -> &LiveChannel {
    &self.channel
  }

  /// Merge the template with the instance's current state.
  pub fn report(&self) -> Report {
    let mut live = self.instance.report();
    live
      .exec
      .entry("id".to_string())
      .or_insert_with(|| Value::from(self.instance.id()));
    Report::merge(&self.template, live, &self.exec)
  }

  pub fn reference(&self) -> WorkflowRef {
    WorkflowRef::instance(self.template.id(), self.id())
  }

  /// Subscribe to this instance's payloads, starting from its current report.
  pub fn subscribe(&self) -> Subscription {
    self.channel.subscribe(self.report().sanitize().into_json())
  }

  /// Apply a lifecycle transition.
  pub fn advance(&mut self, transition: Transition) -> Result<(), OrchestratorError> {
    let next = match (transition, self.lifecycle) {
      (Transition::Begin, Lifecycle::Registered) => Lifecycle::Running,
      (Transition::Update, Lifecycle::Running | Lifecycle::Suspended) => self.lifecycle,
      (Transition::Suspend, Lifecycle::Running) => Lifecycle::Suspended,
      (Transition::Resume, Lifecycle::Suspended) => Lifecycle::Running,
      // Terminal transitions are accepted from anywhere; the instance is
      // removed right after.
      (Transition::End | Transition::Error, state) => state,
      (transition, state) => {
        return Err(OrchestratorError::InvalidTransition {
          exec_id: self.id().to_string(),
          transition,
          state,
        });
      }
    };
    self.lifecycle = next;
    Ok(())
  }
}

/// Mapping from instance identifier to [`RunningWorkflow`].
#[derive(Debug)]
pub struct Registry {
  workflows: HashMap<String, RunningWorkflow>,
  channel_capacity: usize,
}

impl Registry {
  pub fn new(channel_capacity: usize) -> Self {
    Self {
      workflows: HashMap::new(),
      channel_capacity,
    }
  }

  /// Register an instance started by the engine.
  pub fn create(
    &mut self,
    template: Template,
    instance: Arc<dyn Instance>,
    exec: ExecMeta,
  ) -> Result<&RunningWorkflow, OrchestratorError> {
    let id = instance.id().to_string();
    if self.workflows.contains_key(&id) {
      return Err(OrchestratorError::DuplicateInstance(id));
    }

    let workflow = RunningWorkflow::new(template, instance, exec, self.channel_capacity);
    Ok(self.workflows.entry(id).or_insert(workflow))
  }

  pub fn get(&self, exec_id: &str) -> Result<&RunningWorkflow, OrchestratorError> {
    self
      .workflows
      .get(exec_id)
      .ok_or_else(|| OrchestratorError::UnknownInstance(exec_id.to_string()))
  }

  pub fn get_mut(&mut self, exec_id: &str) -> Result<&mut RunningWorkflow, OrchestratorError> {
    self
      .workflows
      .get_mut(exec_id)
      .ok_or_else(|| OrchestratorError::UnknownInstance(exec_id.to_string()))
  }

  /// Remove a finished instance.
  ///
  /// A miss means a terminal event was lost or processed twice.
  pub fn remove(&mut self, exec_id: &str) -> Result<RunningWorkflow, OrchestratorError> {
    self.workflows.remove(exec_id).ok_or_else(|| {
      error!(exec_id = %exec_id, "removing unregistered workflow instance");
      OrchestratorError::UnknownInstance(exec_id.to_string())
    })
  }

  pub fn contains(&self, exec_id: &str) -> bool {
    self.workflows.contains_key(exec_id)
  }

  pub fn len(&self) -> usize {
    self.workflows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.workflows.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &RunningWorkflow> {
    self.workflows.values()
  }

  /// Identifiers of every active instance, sorted.
  pub fn ids(&self) -> Vec<String> {
    let mut ids: Vec<String> = self.workflows.keys().cloned().collect();
    ids.sort();
    ids
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use nyuki_test_utils::{FakeInstance, template};

  fn registry_with(exec_id: &str) -> Registry {
    let mut registry = Registry::new(8);
    registry
      .create(
        template("tpl1", &[]),
        Arc::new(FakeInstance::new(exec_id, "tpl1")),
        ExecMeta::new(),
      )
      .unwrap();
    registry
  }

  #[test]
  fn test_create_and_get() {
    let registry = registry_with("abc");

    let workflow = registry.get("abc").unwrap();
    assert_eq!(workflow.lifecycle(), Lifecycle::Registered);
    assert_eq!(workflow.reference(), WorkflowRef::instance("tpl1", "abc"));
    assert_eq!(workflow.report().exec_id(), Some("abc"));
    assert!(matches!(
      registry.get("missing"),
      Err(OrchestratorError::UnknownInstance(_))
    ));
  }

  #[test]
  fn test_create_rejects_duplicates() {
    let mut registry = registry_with("abc");
    let result = registry.create(
      template("tpl1", &[]),
      Arc::new(FakeInstance::new("abc", "tpl1")),
      ExecMeta::new(),
    );
    assert!(matches!(result, Err(OrchestratorError::DuplicateInstance(id)) if id == "abc"));
    assert_eq!(registry.len(), 1);
  }

  #[test]
  fn test_remove_missing_is_an_error() {
    let mut registry = registry_with("abc");
    assert!(registry.remove("abc").is_ok());
    assert!(registry.is_empty());
    assert!(matches!(
      registry.remove("abc"),
      Err(OrchestratorError::UnknownInstance(_))
    ));
  }

  #[test]
  fn test_lifecycle() {
    let mut registry = registry_with("abc");
    let workflow = registry.get_mut("abc").unwrap();

    // Nothing but begin is accepted before begin
    assert!(workflow.advance(Transition::Update).is_err());
    assert!(workflow.advance(Transition::Resume).is_err());

    workflow.advance(Transition::Begin).unwrap();
    assert!(workflow.advance(Transition::Begin).is_err());
    workflow.advance(Transition::Update).unwrap();

    assert!(workflow.advance(Transition::Resume).is_err());
    workflow.advance(Transition::Suspend).unwrap();
    assert_eq!(workflow.lifecycle(), Lifecycle::Suspended);
    workflow.advance(Transition::Update).unwrap();
    workflow.advance(Transition::Resume).unwrap();
    assert_eq!(workflow.lifecycle(), Lifecycle::Running);

    workflow.advance(Transition::End).unwrap();
  }

  #[test]
  fn test_report_carries_exec_meta() {
    let mut registry = Registry::new(8);
    let workflow = registry
      .create(
        template("tpl1", &[]),
        Arc::new(FakeInstance::new("abc", "tpl1")),
        ExecMeta::new().with_requester("nyuki://parent@api/xyz"),
      )
      .unwrap();

    let report = workflow.report();
    let exec = report.get("exec").unwrap();
    assert_eq!(
      exec.get("requester").and_then(Value::as_str),
      Some("nyuki://parent@api/xyz")
    );
  }
}
