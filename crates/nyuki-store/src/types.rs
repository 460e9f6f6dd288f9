use chrono::{DateTime, Utc};
use nyuki_workflow::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::Error;

/// Options for [`Store::list_templates`](crate::Store::list_templates).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateQuery {
  /// Return complete documents instead of `{id, draft, version, topics}`.
  pub full: bool,
  /// Only the latest published versions; otherwise drafts are included too.
  pub latest: bool,
  /// Overlay each template's metadata.
  pub with_metadata: bool,
}

impl TemplateQuery {
  /// Everything the engine needs to load the published templates.
  pub fn published() -> Self {
    Self {
      full: true,
      latest: true,
      with_metadata: true,
    }
  }
}

impl Default for TemplateQuery {
  fn default() -> Self {
    Self {
      full: false,
      latest: false,
      with_metadata: true,
    }
  }
}

/// The terminal report of a finished instance, as kept in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
  pub exec_id: String,
  pub template_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub requester: Option<String>,
  pub recorded_at: DateTime<Utc>,
  pub document: Document,
}

impl HistoryRecord {
  /// Build a record from a report document.
  ///
  /// The document must carry the template `id` and an `exec.id`.
  pub fn from_document(document: Document) -> Result<Self, Error> {
    let exec = document.get("exec").and_then(JsonValue::as_object);
    let exec_id = exec
      .and_then(|exec| exec.get("id"))
      .and_then(JsonValue::as_str)
      .ok_or_else(|| Error::Invalid("report has no exec.id".to_string()))?
      .to_string();
    let requester = exec
      .and_then(|exec| exec.get("requester"))
      .and_then(JsonValue::as_str)
      .map(str::to_string);
    let template_id = document
      .get("id")
      .and_then(JsonValue::as_str)
      .ok_or_else(|| Error::Invalid(format!("report '{}' has no template id", exec_id)))?
      .to_string();

    Ok(Self {
      exec_id,
      template_id,
      requester,
      recorded_at: Utc::now(),
      document,
    })
  }

  /// Detach the task list from the document.
  pub(crate) fn take_tasks(&mut self) -> Vec<JsonValue> {
    match self.document.remove("tasks") {
      Some(JsonValue::Array(tasks)) => tasks,
      _ => Vec::new(),
    }
  }

  /// Move the record to a fresh exec id, keeping the original one as
  /// `exec.duplicate`.
  pub(crate) fn mark_duplicate(&mut self) {
    let fresh = uuid::Uuid::new_v4().to_string();
    if let Some(JsonValue::Object(exec)) = self.document.get_mut("exec") {
      exec.insert("duplicate".to_string(), JsonValue::String(self.exec_id.clone()));
      exec.insert("id".to_string(), JsonValue::String(fresh.clone()));
    }
    tracing::warn!(exec_id = %self.exec_id, duplicate_id = %fresh, "exec id already recorded");
    self.exec_id = fresh;
  }
}

pub(crate) fn template_id_of(document: &Document) -> Result<String, Error> {
  document
    .get("id")
    .and_then(JsonValue::as_str)
    .filter(|id| !id.is_empty())
    .map(str::to_string)
    .ok_or_else(|| Error::Invalid("template has no id".to_string()))
}

/// Prepare a template document for output.
pub(crate) fn present_template(
  mut document: Document,
  version: i64,
  draft: Option<bool>,
  metadata: Option<&Document>,
  full: bool,
) -> Document {
  document.insert("version".to_string(), JsonValue::from(version));
  document.insert(
    "draft".to_string(),
    draft.map(JsonValue::Bool).unwrap_or(JsonValue::Null),
  );

  if !full {
    document.retain(|key, _| matches!(key.as_str(), "id" | "draft" | "version" | "topics"));
  }

  if let Some(metadata) = metadata {
    for (key, value) in metadata {
      if key != "id" {
        document.insert(key.clone(), value.clone());
      }
    }
  }
  document
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn document(value: JsonValue) -> Document {
    match value {
      JsonValue::Object(map) => map,
      _ => unreachable!(),
    }
  }

  #[test]
  fn test_record_from_report() {
    let mut record = HistoryRecord::from_document(document(json!({
      "id": "tpl1",
      "exec": {"id": "abc", "requester": "nyuki://parent@api"},
      "tasks": [{"id": "a"}]
    })))
    .unwrap();

    assert_eq!(record.exec_id, "abc");
    assert_eq!(record.template_id, "tpl1");
    assert_eq!(record.requester.as_deref(), Some("nyuki://parent@api"));
    assert_eq!(record.take_tasks().len(), 1);
    assert!(record.document.get("tasks").is_none());
  }

  #[test]
  fn test_record_requires_exec_id() {
    let result = HistoryRecord::from_document(document(json!({"id": "tpl1", "exec": {}})));
    assert!(matches!(result, Err(Error::Invalid(_))));
  }

  #[test]
  fn test_mark_duplicate() {
    let mut record =
      HistoryRecord::from_document(document(json!({"id": "tpl1", "exec": {"id": "abc"}})))
        .unwrap();
    record.mark_duplicate();

    assert_ne!(record.exec_id, "abc");
    assert_eq!(record.document["exec"]["duplicate"], "abc");
    assert_eq!(record.document["exec"]["id"], record.exec_id.as_str());
  }

  #[test]
  fn test_present_summary_with_metadata() {
    let metadata = document(json!({"id": "tpl1", "title": "Escalation", "tags": ["ops"]}));
    let summary = present_template(
      document(json!({"id": "tpl1", "topics": ["alerts"], "graph": {}})),
      3,
      Some(false),
      Some(&metadata),
      false,
    );

    assert_eq!(
      JsonValue::Object(summary),
      json!({
        "id": "tpl1",
        "version": 3,
        "draft": false,
        "topics": ["alerts"],
        "title": "Escalation",
        "tags": ["ops"]
      })
    );
  }
}
