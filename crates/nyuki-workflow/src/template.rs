use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::WorkflowError;

/// A JSON document as stored for templates and their metadata.
pub type Document = serde_json::Map<String, JsonValue>;

/// A lightweight reference to a template, as returned by topic selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateRef {
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<u64>,
}

impl TemplateRef {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      version: None,
    }
  }

  pub fn with_version(mut self, version: u64) -> Self {
    self.version = Some(version);
    self
  }
}

/// An immutable workflow definition.
///
/// Only the identifier, version, task list and graph are interpreted; every
/// other field of the document is carried along untouched into reports.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
  id: String,
  version: u64,
  document: Document,
}

impl Template {
  /// Build a template from a stored document, checking its structure.
  pub fn from_document(document: JsonValue) -> Result<Self, WorkflowError> {
    match document {
      JsonValue::Object(map) => Self::from_map(map),
      _ => Err(WorkflowError::NotAnObject),
    }
  }

  pub fn from_map(document: Document) -> Result<Self, WorkflowError> {
    let id = match document.get("id") {
      Some(JsonValue::String(id)) if !id.is_empty() => id.clone(),
      Some(_) => {
        return Err(WorkflowError::InvalidField {
          field: "id",
          message: "expected a non-empty string".to_string(),
        });
      }
      None => return Err(WorkflowError::MissingField("id")),
    };

    let version = match document.get("version") {
      None | Some(JsonValue::Null) => 1,
      Some(v) => v.as_u64().ok_or_else(|| WorkflowError::InvalidField {
        field: "version",
        message: format!("expected a positive integer, got {}", v),
      })?,
    };

    validate_tasks_and_graph(&document)?;

    Ok(Self {
      id,
      version,
      document,
    })
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn version(&self) -> u64 {
    self.version
  }

  pub fn title(&self) -> Option<&str> {
    self.document.get("title").and_then(JsonValue::as_str)
  }

  /// Topics this template listens to. `None` when the template declares none.
  pub fn topics(&self) -> Option<Vec<&str>> {
    self
      .document
      .get("topics")
      .and_then(JsonValue::as_array)
      .map(|topics| topics.iter().filter_map(JsonValue::as_str).collect())
  }

  /// A template without declared topics accepts every topic.
  pub fn matches_topic(&self, topic: &str) -> bool {
    match self.topics() {
      Some(topics) => topics.contains(&topic),
      None => true,
    }
  }

  /// Static task definitions.
  pub fn tasks(&self) -> impl Iterator<Item = &Document> {
    self
      .document
      .get("tasks")
      .and_then(JsonValue::as_array)
      .into_iter()
      .flatten()
      .filter_map(JsonValue::as_object)
  }

  pub fn document(&self) -> &Document {
    &self.document
  }

  pub fn into_document(self) -> Document {
    self.document
  }

  /// The document without its graph and task list.
  pub fn summary(&self) -> Document {
    let mut summary = self.document.clone();
    summary.remove("graph");
    summary.remove("tasks");
    summary
  }

  pub fn reference(&self) -> TemplateRef {
    TemplateRef::new(&self.id).with_version(self.version)
  }
}

fn validate_tasks_and_graph(document: &Document) -> Result<(), WorkflowError> {
  let tasks = match document.get("tasks") {
    Some(JsonValue::Array(tasks)) => tasks,
    Some(_) => {
      return Err(WorkflowError::InvalidField {
        field: "tasks",
        message: "expected an array".to_string(),
      });
    }
    None => return Err(WorkflowError::MissingField("tasks")),
  };

  let mut task_ids = HashSet::new();
  for task in tasks {
    let task_id = task
      .get("id")
      .and_then(JsonValue::as_str)
      .ok_or_else(|| WorkflowError::InvalidField {
        field: "tasks",
        message: "every task needs a string 'id'".to_string(),
      })?;
    if !task_ids.insert(task_id) {
      return Err(WorkflowError::DuplicateTask(task_id.to_string()));
    }
  }

  let graph = match document.get("graph") {
    None | Some(JsonValue::Null) => return Ok(()),
    Some(JsonValue::Object(graph)) => graph,
    Some(_) => return Err(WorkflowError::Graph("expected an object".to_string())),
  };

  for (node, successors) in graph {
    if !task_ids.contains(node.as_str()) {
      return Err(WorkflowError::Graph(format!("unknown task '{}'", node)));
    }
    let successors = successors
      .as_array()
      .ok_or_else(|| WorkflowError::Graph(format!("successors of '{}' must be a list", node)))?;
    for next in successors {
      match next.as_str() {
        Some(next) if task_ids.contains(next) => {}
        _ => {
          return Err(WorkflowError::Graph(format!(
            "task '{}' points to unknown task {}",
            node, next
          )));
        }
      }
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn doc() -> JsonValue {
    json!({
      "id": "tpl1",
      "version": 3,
      "title": "Escalation",
      "topics": ["alerts"],
      "tasks": [
        {"id": "a", "name": "join", "title": "Start"},
        {"id": "b", "name": "join", "title": "Finish"}
      ],
      "graph": {"a": ["b"], "b": []}
    })
  }

  #[test]
  fn test_from_document() {
    let template = Template::from_document(doc()).unwrap();
    assert_eq!(template.id(), "tpl1");
    assert_eq!(template.version(), 3);
    assert_eq!(template.title(), Some("Escalation"));
    assert_eq!(template.tasks().count(), 2);
    assert_eq!(template.reference(), TemplateRef::new("tpl1").with_version(3));
  }

  #[test]
  fn test_version_defaults_to_one() {
    let template = Template::from_document(json!({"id": "x", "tasks": []})).unwrap();
    assert_eq!(template.version(), 1);
  }

  #[test]
  fn test_rejects_missing_tasks() {
    let err = Template::from_document(json!({"id": "x"})).unwrap_err();
    assert!(matches!(err, WorkflowError::MissingField("tasks")));
  }

  #[test]
  fn test_rejects_duplicate_tasks() {
    let err = Template::from_document(json!({
      "id": "x",
      "tasks": [{"id": "a"}, {"id": "a"}]
    }))
    .unwrap_err();
    assert!(matches!(err, WorkflowError::DuplicateTask(id) if id == "a"));
  }

  #[test]
  fn test_rejects_dangling_graph_edge() {
    let err = Template::from_document(json!({
      "id": "x",
      "tasks": [{"id": "a"}],
      "graph": {"a": ["ghost"]}
    }))
    .unwrap_err();
    assert!(matches!(err, WorkflowError::Graph(_)));
  }

  #[test]
  fn test_rejects_non_object() {
    assert!(matches!(
      Template::from_document(json!([1, 2])),
      Err(WorkflowError::NotAnObject)
    ));
  }

  #[test]
  fn test_topic_matching() {
    let template = Template::from_document(doc()).unwrap();
    assert!(template.matches_topic("alerts"));
    assert!(!template.matches_topic("tickets"));

    let any = Template::from_document(json!({"id": "y", "tasks": []})).unwrap();
    assert!(any.matches_topic("tickets"));
  }

  #[test]
  fn test_summary_strips_graph_and_tasks() {
    let summary = Template::from_document(doc()).unwrap().summary();
    assert!(!summary.contains_key("graph"));
    assert!(!summary.contains_key("tasks"));
    assert_eq!(summary["title"], "Escalation");
  }
}
