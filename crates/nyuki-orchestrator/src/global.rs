use nyuki_channel::{LiveChannel, Subscription};
use serde_json::Value as JsonValue;

use crate::registry::Registry;

/// Fleet-wide view of active instances.
///
/// Fleet subscribers get reports without the task graph or per-task detail.
#[derive(Debug, Clone)]
pub struct GlobalBroadcaster {
  channel: LiveChannel,
}

impl GlobalBroadcaster {
  pub fn new(channel_capacity: usize) -> Self {
    Self {
      channel: LiveChannel::new("/workflow/instances", channel_capacity),
    }
  }

  /// Stripped reports of every active instance.
  pub fn snapshot(registry: &Registry) -> JsonValue {
    let mut workflows: Vec<_> = registry.iter().collect();
    workflows.sort_by(|a, b| a.id().cmp(b.id()));
    JsonValue::Array(
      workflows
        .into_iter()
        .map(|workflow| workflow.report().strip_detail().sanitize().into_json())
        .collect(),
    )
  }

  /// Forward a payload, stripping the graph and tasks of an embedded template.
  pub fn broadcast(&self, payload: &JsonValue) {
    let mut payload = payload.clone();
    if let Some(template) = payload.get_mut("template").and_then(JsonValue::as_object_mut) {
      template.remove("graph");
      template.remove("tasks");
    }
    self.channel.broadcast(payload);
  }

  /// Subscribe, receiving the current snapshot first.
  pub fn subscribe(&self, registry: &Registry) -> Subscription {
    self.channel.subscribe(Self::snapshot(registry))
  }

  pub fn close(&self) {
    self.channel.close();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  use nyuki_test_utils::{FakeInstance, template};
  use nyuki_workflow::ExecMeta;
  use serde_json::json;

  #[tokio::test]
  async fn test_snapshot_first_then_stripped_payloads() {
    let mut registry = Registry::new(8);
    registry
      .create(
        template("tpl1", &[]),
        Arc::new(FakeInstance::new("abc", "tpl1")),
        ExecMeta::new(),
      )
      .unwrap();

    let global = GlobalBroadcaster::new(8);
    let mut subscription = global.subscribe(&registry);

    let snapshot = subscription.recv().await.unwrap();
    assert_eq!(snapshot[0]["exec"]["id"], "abc");
    assert!(snapshot[0].get("tasks").is_none());
    assert!(snapshot[0].get("graph").is_none());

    global.broadcast(&json!({
      "type": "begin",
      "template": {"id": "tpl1", "tasks": [], "graph": {}}
    }));
    let payload = subscription.recv().await.unwrap();
    assert_eq!(payload["template"], json!({"id": "tpl1"}));
  }
}
