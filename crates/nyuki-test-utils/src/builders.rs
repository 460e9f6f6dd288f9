use nyuki_store::Store;
use nyuki_workflow::{Document, Map, Template, Value};
use serde_json::{Value as JsonValue, json};

/// A valid template document with two chained tasks, `a` then `b`.
///
/// With no `topics` the template matches every topic.
pub fn template_document(id: &str, topics: &[&str]) -> Document {
  let mut document = json!({
    "id": id,
    "version": 1,
    "title": format!("Template {id}"),
    "tasks": [
      {"id": "a", "name": "join", "title": "First step", "config": {"timeout": 10}},
      {"id": "b", "name": "join", "title": "Second step"}
    ],
    "graph": {"a": ["b"], "b": []}
  });
  if !topics.is_empty() {
    document["topics"] = json!(topics);
  }
  into_document(document)
}

/// A document whose graph points at a task that does not exist.
pub fn invalid_template_document(id: &str) -> Document {
  into_document(json!({
    "id": id,
    "tasks": [{"id": "a"}],
    "graph": {"a": ["missing"]}
  }))
}

pub fn template(id: &str, topics: &[&str]) -> Template {
  Template::from_map(template_document(id, topics)).expect("test template is valid")
}

/// Save and publish a template.
pub async fn publish(store: &dyn Store, document: Document) {
  let id = document
    .get("id")
    .and_then(JsonValue::as_str)
    .expect("template has an id")
    .to_string();
  store.save_draft(document).await.expect("draft saved");
  store.publish_draft(&id).await.expect("draft published");
}

/// A live task entry.
pub fn task(id: &str, status: &str) -> Map {
  let mut task = Map::new();
  task.insert("id".to_string(), Value::from(id));
  task.insert("status".to_string(), Value::from(status));
  task
}

fn into_document(value: JsonValue) -> Document {
  match value {
    JsonValue::Object(map) => map,
    other => panic!("expected an object, got {other}"),
  }
}
