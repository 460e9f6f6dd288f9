use chrono::{DateTime, Utc};
use nyuki_engine::{EventSource, ExecEvent, Transition};
use nyuki_workflow::{Document, ExecMeta, Value};
use serde_json::{Value as JsonValue, json};

/// The normalized form of an engine event, as delivered to subscribers.
///
/// ```json
/// {
///   "type": "begin",
///   "data": {...},
///   "source": {"workflow_template_id": "tpl1", "workflow_exec_id": "abc",
///              "workflow_exec_requester": "nyuki://parent@api/xyz"},
///   "timestamp": "2026-01-01T00:00:00+00:00",
///   "template": {...}
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExecPayload {
  pub transition: Transition,
  pub data: Value,
  pub source: EventSource,
  /// Requester stored with the instance, for correlation.
  pub requester: Option<String>,
  pub timestamp: DateTime<Utc>,
  /// Full template document, attached on `begin`.
  pub template: Option<Document>,
}

impl ExecPayload {
  pub fn new(event: ExecEvent, exec: &ExecMeta) -> Self {
    Self {
      transition: event.transition,
      data: event.content.unwrap_or_default(),
      source: event.source,
      requester: exec.requester().map(str::to_string),
      timestamp: Utc::now(),
      template: None,
    }
  }

  pub fn with_template(mut self, template: Document) -> Self {
    self.template = Some(template);
    self
  }

  pub fn into_json(self) -> JsonValue {
    let mut source = json!({
      "workflow_template_id": self.source.workflow_template_id,
      "workflow_exec_id": self.source.workflow_exec_id,
    });
    if let Some(object) = source.as_object_mut() {
      if let Some(task_template_id) = self.source.task_template_id {
        object.insert("task_template_id".to_string(), task_template_id.into());
      }
      if let Some(task_exec_id) = self.source.task_exec_id {
        object.insert("task_exec_id".to_string(), task_exec_id.into());
      }
      if let Some(requester) = self.requester {
        object.insert("workflow_exec_requester".to_string(), requester.into());
      }
    }

    let mut payload = json!({
      "type": self.transition.as_str(),
      "data": self.data.into_json(),
      "source": source,
      "timestamp": self.timestamp.to_rfc3339(),
    });
    if let (Some(template), Some(object)) = (self.template, payload.as_object_mut()) {
      object.insert("template".to_string(), JsonValue::Object(template));
    }
    payload
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_source_carries_requester() {
    let event = ExecEvent::new(
      Transition::Update,
      EventSource::workflow("tpl1", "abc").with_task("a", "t1"),
    )
    .with_content(Value::opaque(7u8));
    let meta = ExecMeta::new().with_requester("nyuki://parent@api/xyz");

    let json = ExecPayload::new(event, &meta).into_json();

    assert_eq!(json["type"], "update");
    assert_eq!(json["data"], "Internal server data: u8");
    assert_eq!(json["source"]["workflow_exec_id"], "abc");
    assert_eq!(json["source"]["task_exec_id"], "t1");
    assert_eq!(
      json["source"]["workflow_exec_requester"],
      "nyuki://parent@api/xyz"
    );
    assert!(json.get("template").is_none());
  }

  #[test]
  fn test_template_attached() {
    let event = ExecEvent::new(Transition::Begin, EventSource::workflow("tpl1", "abc"));
    let mut template = Document::new();
    template.insert("id".to_string(), "tpl1".into());

    let json = ExecPayload::new(event, &ExecMeta::new())
      .with_template(template)
      .into_json();

    assert_eq!(json["template"]["id"], "tpl1");
    assert!(json["source"].get("workflow_exec_requester").is_none());
    assert!(json["data"].is_null());
  }
}
