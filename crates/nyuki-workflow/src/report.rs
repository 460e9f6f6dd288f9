//! Merging a template with a live instance into an external report.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::exec_meta::ExecMeta;
use crate::template::{Document, Template};
use crate::value::{Map, Value};

/// Execution state as reported by the engine for one instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveReport {
  /// The instance's exec block (`id`, `state`, `start`, ...).
  pub exec: Map,
  /// Tasks that have executed or are executing.
  pub tasks: Vec<Map>,
}

/// The externally consumable document describing a running or finished
/// instance.
///
/// Template fields sit at the top level; `exec` and `tasks` come from the
/// live instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Report(Map);

impl Report {
  /// Merge a template with the live state of one of its instances.
  ///
  /// Each live task is enriched with its static definition; live fields win
  /// on conflicting keys. Tasks only present in the template have not run
  /// and are left out.
  pub fn merge(template: &Template, live: LiveReport, exec_meta: &ExecMeta) -> Self {
    let static_tasks: HashMap<&str, &Document> = template
      .tasks()
      .filter_map(|task| {
        task
          .get("id")
          .and_then(JsonValue::as_str)
          .map(|id| (id, task))
      })
      .collect();

    let tasks = live
      .tasks
      .into_iter()
      .map(|task| {
        let definition = task
          .get("id")
          .and_then(Value::as_str)
          .and_then(|id| static_tasks.get(id));
        match definition {
          Some(definition) => deep_merge(to_map(definition), task),
          None => task,
        }
      })
      .map(Value::Mapping)
      .collect();

    let mut exec = live.exec;
    exec_meta.apply(&mut exec);

    let mut report = to_map(template.document());
    report.insert("exec".to_string(), Value::Mapping(exec));
    report.insert("tasks".to_string(), Value::Sequence(tasks));
    Self(report)
  }

  pub fn from_map(map: Map) -> Self {
    Self(map)
  }

  pub fn as_map(&self) -> &Map {
    &self.0
  }

  pub fn into_map(self) -> Map {
    self.0
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.0.get(key)
  }

  /// The instance identifier from the exec block.
  pub fn exec_id(&self) -> Option<&str> {
    self.0.get("exec")?.get("id")?.as_str()
  }

  pub fn template_id(&self) -> Option<&str> {
    self.0.get("id")?.as_str()
  }

  pub fn tasks(&self) -> &[Value] {
    self
      .0
      .get("tasks")
      .and_then(Value::as_sequence)
      .unwrap_or_default()
  }

  /// Drop the task graph and per-task detail, for fleet-wide views.
  pub fn strip_detail(mut self) -> Self {
    self.0.remove("graph");
    self.0.remove("tasks");
    self
  }

  /// Replace non-serializable values with placeholder text.
  pub fn sanitize(self) -> Self {
    Self(
      self
        .0
        .into_iter()
        .map(|(key, value)| (key, value.sanitize()))
        .collect(),
    )
  }

  pub fn is_sanitized(&self) -> bool {
    self.0.values().all(Value::is_sanitized)
  }

  pub fn into_json(self) -> JsonValue {
    JsonValue::Object(self.into_document())
  }

  pub fn into_document(self) -> Document {
    self
      .0
      .into_iter()
      .map(|(key, value)| (key, value.into_json()))
      .collect()
  }
}

/// Recursively merge `overlay` into `base`; overlay values win except where
/// both sides hold mappings, which are merged in turn.
pub fn deep_merge(mut base: Map, overlay: Map) -> Map {
  for (key, value) in overlay {
    if let Value::Mapping(incoming) = value {
      if let Some(Value::Mapping(existing)) = base.get_mut(&key) {
        let current = std::mem::take(existing);
        *existing = deep_merge(current, incoming);
        continue;
      }
      base.insert(key, Value::Mapping(incoming));
    } else {
      base.insert(key, value);
    }
  }
  base
}

fn to_map(document: &Document) -> Map {
  document
    .iter()
    .map(|(key, value)| (key.clone(), Value::from(value.clone())))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn template() -> Template {
    Template::from_document(json!({
      "id": "tpl1",
      "version": 2,
      "title": "Escalation",
      "tasks": [
        {"id": "a", "name": "join", "title": "Start", "config": {"timeout": 10, "mode": "fast"}},
        {"id": "b", "name": "join", "title": "Never ran"}
      ],
      "graph": {"a": ["b"]}
    }))
    .unwrap()
  }

  fn task(id: &str, status: &str) -> Map {
    let mut task = Map::new();
    task.insert("id".to_string(), Value::from(id));
    task.insert("status".to_string(), Value::from(status));
    task
  }

  fn live() -> LiveReport {
    let mut exec = Map::new();
    exec.insert("id".to_string(), Value::from("abc"));
    exec.insert("state".to_string(), Value::from("progress"));

    let mut a = task("a", "done");
    a.insert("title".to_string(), Value::from("Start (live)"));
    let mut config = Map::new();
    config.insert("timeout".to_string(), Value::Integer(30));
    a.insert("config".to_string(), Value::Mapping(config));

    LiveReport {
      exec,
      tasks: vec![a, task("dynamic", "running")],
    }
  }

  #[test]
  fn test_merge_keeps_template_fields() {
    let report = Report::merge(&template(), live(), &ExecMeta::new());

    assert_eq!(report.template_id(), Some("tpl1"));
    assert_eq!(report.exec_id(), Some("abc"));
    assert_eq!(report.get("title"), Some(&Value::from("Escalation")));
    assert!(report.get("graph").is_some());
  }

  #[test]
  fn test_merge_live_fields_win() {
    let report = Report::merge(&template(), live(), &ExecMeta::new());
    let a = &report.tasks()[0];

    assert_eq!(a.get("title"), Some(&Value::from("Start (live)")));
    assert_eq!(a.get("name"), Some(&Value::from("join")));
    assert_eq!(a.get("status"), Some(&Value::from("done")));

    let config = a.get("config").unwrap();
    assert_eq!(config.get("timeout"), Some(&Value::Integer(30)));
    assert_eq!(config.get("mode"), Some(&Value::from("fast")));
  }

  #[test]
  fn test_merge_task_presence() {
    let report = Report::merge(&template(), live(), &ExecMeta::new());
    let ids: Vec<_> = report
      .tasks()
      .iter()
      .filter_map(|t| t.get("id").and_then(Value::as_str))
      .collect();

    // Template-only task "b" has not run; live-only "dynamic" is kept.
    assert_eq!(ids, vec!["a", "dynamic"]);
  }

  #[test]
  fn test_merge_overlays_exec_meta() {
    let meta = ExecMeta::new().with_requester("nyuki://parent@api/xyz");
    let report = Report::merge(&template(), live(), &meta);
    let exec = report.get("exec").unwrap();

    assert_eq!(
      exec.get("requester"),
      Some(&Value::from("nyuki://parent@api/xyz"))
    );
    assert_eq!(exec.get("state"), Some(&Value::from("progress")));
  }

  #[test]
  fn test_merge_is_idempotent() {
    let meta = ExecMeta::new().with_track("t");
    let first = Report::merge(&template(), live(), &meta);
    let second = Report::merge(&template(), live(), &meta);
    assert_eq!(first, second);
  }

  #[test]
  fn test_strip_detail() {
    let report = Report::merge(&template(), live(), &ExecMeta::new()).strip_detail();
    assert!(report.get("graph").is_none());
    assert!(report.get("tasks").is_none());
    assert!(report.get("exec").is_some());
  }

  #[test]
  fn test_sanitize_report() {
    let mut state = live();
    state.tasks[0].insert("handle".to_string(), Value::opaque(42u16));

    let report = Report::merge(&template(), state, &ExecMeta::new());
    assert!(!report.is_sanitized());

    let json = report.sanitize().into_json();
    assert_eq!(json["tasks"][0]["handle"], "Internal server data: u16");
  }
}
