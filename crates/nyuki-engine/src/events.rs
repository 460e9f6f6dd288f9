//! Lifecycle events and notifiers.
//!
//! The engine emits one event per lifecycle transition of a workflow instance.
//! Events for a given instance are delivered strictly in order.

use std::fmt;

use nyuki_workflow::Value;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A lifecycle transition of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
  Begin,
  Suspend,
  Resume,
  End,
  Error,
  /// Progress of the instance, including task-level changes.
  #[serde(other)]
  Update,
}

impl Transition {
  /// `end` and `error` close an instance's lifecycle.
  pub fn is_terminal(self) -> bool {
    matches!(self, Transition::End | Transition::Error)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Transition::Begin => "begin",
      Transition::Update => "update",
      Transition::Suspend => "suspend",
      Transition::Resume => "resume",
      Transition::End => "end",
      Transition::Error => "error",
    }
  }
}

impl fmt::Display for Transition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Where an event originated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSource {
  pub workflow_template_id: String,
  pub workflow_exec_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_template_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_exec_id: Option<String>,
}

impl EventSource {
  pub fn workflow(template_id: impl Into<String>, exec_id: impl Into<String>) -> Self {
    Self {
      workflow_template_id: template_id.into(),
      workflow_exec_id: exec_id.into(),
      task_template_id: None,
      task_exec_id: None,
    }
  }

  pub fn with_task(mut self, template_id: impl Into<String>, exec_id: impl Into<String>) -> Self {
    self.task_template_id = Some(template_id.into());
    self.task_exec_id = Some(exec_id.into());
    self
  }
}

/// An event emitted by the engine for one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecEvent {
  pub transition: Transition,
  /// Transition-specific content, if any.
  pub content: Option<Value>,
  pub source: EventSource,
}

impl ExecEvent {
  pub fn new(transition: Transition, source: EventSource) -> Self {
    Self {
      transition,
      content: None,
      source,
    }
  }

  pub fn with_content(mut self, content: impl Into<Value>) -> Self {
    self.content = Some(content.into());
    self
  }

  pub fn exec_id(&self) -> &str {
    &self.source.workflow_exec_id
  }
}

/// Trait for receiving execution events.
///
/// The engine calls `notify` for each event; implementations decide what to
/// do with them. `notify` must not block the engine.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecEvent);
}

/// A notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecEvent) {}
}

/// A notifier that forwards events to an unbounded channel.
///
/// The channel preserves emission order, which the consumer relies on for
/// per-instance ordering.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls the engine. Event volume is a
  // handful of transitions per instance.
  sender: mpsc::UnboundedSender<ExecEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecEvent>) -> Self {
    Self { sender }
  }

  /// Create a notifier together with the receiving end.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecEvent) {
    // Receiver may have been dropped during shutdown
    let _ = self.sender.send(event);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transition_wire_names() {
    assert_eq!(serde_json::to_value(Transition::Begin).unwrap(), "begin");
    assert_eq!(
      serde_json::from_value::<Transition>("error".into()).unwrap(),
      Transition::Error
    );
    assert_eq!(
      serde_json::from_value::<Transition>("update".into()).unwrap(),
      Transition::Update
    );
    assert_eq!(serde_json::to_value(Transition::Update).unwrap(), "update");
    // Anything the engine reports beyond the known transitions is progress.
    assert_eq!(
      serde_json::from_value::<Transition>("progress".into()).unwrap(),
      Transition::Update
    );
  }

  #[test]
  fn test_terminal_transitions() {
    assert!(Transition::End.is_terminal());
    assert!(Transition::Error.is_terminal());
    assert!(!Transition::Suspend.is_terminal());
  }

  #[test]
  fn test_source_serialization_skips_missing_task() {
    let source = EventSource::workflow("tpl1", "abc");
    let json = serde_json::to_value(&source).unwrap();
    assert_eq!(json["workflow_exec_id"], "abc");
    assert!(json.get("task_exec_id").is_none());
  }

  #[tokio::test]
  async fn test_channel_notifier_preserves_order() {
    let (notifier, mut receiver) = ChannelNotifier::channel();
    let source = EventSource::workflow("tpl1", "abc");

    notifier.notify(ExecEvent::new(Transition::Begin, source.clone()));
    notifier.notify(ExecEvent::new(Transition::End, source));

    assert_eq!(receiver.recv().await.unwrap().transition, Transition::Begin);
    assert_eq!(receiver.recv().await.unwrap().transition, Transition::End);
  }

  #[test]
  fn test_channel_notifier_ignores_closed_receiver() {
    let (notifier, receiver) = ChannelNotifier::channel();
    drop(receiver);
    notifier.notify(ExecEvent::new(
      Transition::Update,
      EventSource::workflow("tpl1", "abc"),
    ));
  }
}
