use std::collections::HashMap;

use async_trait::async_trait;
use nyuki_workflow::Document;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;

use crate::types::{present_template, template_id_of};
use crate::{Error, HistoryRecord, Store, TemplateQuery};

struct StoredTemplate {
  template_id: String,
  version: i64,
  draft: Option<bool>,
  document: Document,
}

#[derive(Default)]
struct Inner {
  templates: Vec<StoredTemplate>,
  metadata: HashMap<String, Document>,
  instances: Vec<HistoryRecord>,
  tasks: HashMap<String, Vec<JsonValue>>,
}

/// In-memory store, for tests and for running without a database.
#[derive(Default)]
pub struct MemoryStore {
  inner: RwLock<Inner>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn get_template(
    &self,
    template_id: &str,
    draft: bool,
    with_metadata: bool,
  ) -> Result<Document, Error> {
    let inner = self.inner.read().await;
    let stored = inner
      .templates
      .iter()
      .find(|t| t.template_id == template_id && t.draft == Some(draft))
      .ok_or_else(|| Error::NotFound(format!("template '{}'", template_id)))?;

    let metadata = with_metadata
      .then(|| inner.metadata.get(template_id))
      .flatten();

    Ok(present_template(
      stored.document.clone(),
      stored.version,
      stored.draft,
      metadata,
      true,
    ))
  }

  async fn list_templates(&self, query: TemplateQuery) -> Result<Vec<Document>, Error> {
    let inner = self.inner.read().await;
    let mut selected: Vec<&StoredTemplate> = inner
      .templates
      .iter()
      .filter(|t| match t.draft {
        Some(draft) => !(query.latest && draft),
        None => false,
      })
      .collect();
    selected.sort_by(|a, b| (&a.template_id, a.version).cmp(&(&b.template_id, b.version)));

    Ok(
      selected
        .into_iter()
        .map(|t| {
          let metadata = query
            .with_metadata
            .then(|| inner.metadata.get(&t.template_id))
            .flatten();
          present_template(t.document.clone(), t.version, t.draft, metadata, query.full)
        })
        .collect(),
    )
  }

  async fn save_draft(&self, mut template: Document) -> Result<Document, Error> {
    let template_id = template_id_of(&template)?;
    let mut inner = self.inner.write().await;

    let published = inner
      .templates
      .iter()
      .filter(|t| t.template_id == template_id && t.draft != Some(true))
      .map(|t| t.version)
      .max()
      .unwrap_or(0);
    let version = published + 1;
    template.insert("version".to_string(), JsonValue::from(version));
    template.remove("draft");

    inner
      .templates
      .retain(|t| !(t.template_id == template_id && t.draft == Some(true)));
    inner.templates.push(StoredTemplate {
      template_id,
      version,
      draft: Some(true),
      document: template.clone(),
    });

    Ok(present_template(template, version, Some(true), None, true))
  }

  async fn publish_draft(&self, template_id: &str) -> Result<u64, Error> {
    let mut inner = self.inner.write().await;
    let version = inner
      .templates
      .iter()
      .find(|t| t.template_id == template_id && t.draft == Some(true))
      .map(|t| t.version)
      .ok_or_else(|| Error::NotFound(format!("draft of template '{}'", template_id)))?;

    for stored in inner
      .templates
      .iter_mut()
      .filter(|t| t.template_id == template_id)
    {
      stored.draft = match stored.draft {
        Some(false) => None,
        Some(true) => Some(false),
        None => None,
      };
    }

    Ok(version as u64)
  }

  async fn set_metadata(&self, template_id: &str, metadata: Document) -> Result<(), Error> {
    self
      .inner
      .write()
      .await
      .metadata
      .insert(template_id.to_string(), metadata);
    Ok(())
  }

  async fn insert_instance(&self, mut record: HistoryRecord) -> Result<String, Error> {
    let tasks = record.take_tasks();
    let mut inner = self.inner.write().await;

    if inner.instances.iter().any(|r| r.exec_id == record.exec_id) {
      record.mark_duplicate();
    }

    let exec_id = record.exec_id.clone();
    inner.tasks.insert(exec_id.clone(), tasks);
    inner.instances.push(record);
    Ok(exec_id)
  }

  async fn get_instance(&self, exec_id: &str) -> Result<Document, Error> {
    let inner = self.inner.read().await;
    let record = inner
      .instances
      .iter()
      .find(|r| r.exec_id == exec_id)
      .ok_or_else(|| Error::NotFound(format!("instance '{}'", exec_id)))?;

    let mut document = record.document.clone();
    let tasks = inner.tasks.get(exec_id).cloned().unwrap_or_default();
    document.insert("tasks".to_string(), JsonValue::Array(tasks));
    Ok(document)
  }

  async fn list_instances(&self, limit: u32) -> Result<Vec<HistoryRecord>, Error> {
    let inner = self.inner.read().await;
    let mut records: Vec<HistoryRecord> = inner.instances.iter().rev().cloned().collect();
    // Stable, so insertion order breaks ties
    records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
    records.truncate(limit as usize);
    Ok(records)
  }
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

  async fn publish(store: &MemoryStore, template: JsonValue) -> u64 {
    let template = document(template);
    let id = template["id"].as_str().unwrap().to_string();
    store.save_draft(template).await.unwrap();
    store.publish_draft(&id).await.unwrap()
  }

  #[tokio::test]
  async fn test_draft_publish_cycle() {
    let store = MemoryStore::new();

    assert_eq!(publish(&store, json!({"id": "tpl1", "title": "v1"})).await, 1);
    assert_eq!(publish(&store, json!({"id": "tpl1", "title": "v2"})).await, 2);
    store
      .save_draft(document(json!({"id": "tpl1", "title": "v3"})))
      .await
      .unwrap();

    let latest = store.get_template("tpl1", false, false).await.unwrap();
    assert_eq!(latest["title"], "v2");
    assert_eq!(latest["draft"], false);

    let draft = store.get_template("tpl1", true, false).await.unwrap();
    assert_eq!(draft["version"], 3);

    // Archived v1 is never listed
    let all = store.list_templates(TemplateQuery::default()).await.unwrap();
    assert_eq!(all.len(), 2);
    let latest = store.list_templates(TemplateQuery::published()).await.unwrap();
    assert_eq!(latest.len(), 1);
  }

  #[tokio::test]
  async fn test_publish_without_draft() {
    let store = MemoryStore::new();
    let result = store.publish_draft("missing").await;
    assert!(matches!(result, Err(Error::NotFound(_))));
  }

  #[tokio::test]
  async fn test_metadata_overlay() {
    let store = MemoryStore::new();
    publish(&store, json!({"id": "tpl1", "title": "stored"})).await;
    store
      .set_metadata("tpl1", document(json!({"id": "tpl1", "title": "Escalation"})))
      .await
      .unwrap();

    let with = store.get_template("tpl1", false, true).await.unwrap();
    assert_eq!(with["title"], "Escalation");
    let without = store.get_template("tpl1", false, false).await.unwrap();
    assert_eq!(without["title"], "stored");
  }

  #[tokio::test]
  async fn test_duplicate_instance_is_kept() {
    let store = MemoryStore::new();
    let report = document(json!({
      "id": "tpl1",
      "exec": {"id": "abc"},
      "tasks": [{"id": "a", "exec": {"id": "t1"}}]
    }));

    let first = store
      .insert_instance(HistoryRecord::from_document(report.clone()).unwrap())
      .await
      .unwrap();
    let second = store
      .insert_instance(HistoryRecord::from_document(report).unwrap())
      .await
      .unwrap();

    assert_eq!(first, "abc");
    assert_ne!(second, "abc");

    let duplicate = store.get_instance(&second).await.unwrap();
    assert_eq!(duplicate["exec"]["duplicate"], "abc");
    assert_eq!(duplicate["tasks"][0]["id"], "a");
    assert_eq!(store.list_instances(10).await.unwrap().len(), 2);
  }
}
