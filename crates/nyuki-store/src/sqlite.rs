use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nyuki_workflow::Document;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::types::{present_template, template_id_of};
use crate::{Error, HistoryRecord, Store, TemplateQuery};

#[derive(FromRow)]
struct TemplateRow {
  template_id: String,
  version: i64,
  draft: Option<bool>,
  document: Json<Document>,
}

#[derive(FromRow)]
struct MetadataRow {
  template_id: String,
  document: Json<Document>,
}

#[derive(FromRow)]
struct InstanceRow {
  exec_id: String,
  template_id: String,
  requester: Option<String>,
  recorded_at: DateTime<Utc>,
  document: Json<Document>,
}

impl From<InstanceRow> for HistoryRecord {
  fn from(row: InstanceRow) -> Self {
    Self {
      exec_id: row.exec_id,
      template_id: row.template_id,
      requester: row.requester,
      recorded_at: row.recorded_at,
      document: row.document.0,
    }
  }
}

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) the database at `url`.
  pub async fn connect(url: &str) -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(Self::new(pool))
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), Error> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }

  async fn metadata(&self, template_id: &str) -> Result<Option<Document>, Error> {
    let row: Option<MetadataRow> = sqlx::query_as(
      r#"
      SELECT template_id, document
      FROM template_metadata
      WHERE template_id = ?
      "#,
    )
    .bind(template_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(|row| row.document.0))
  }

  async fn all_metadata(&self) -> Result<HashMap<String, Document>, Error> {
    let rows: Vec<MetadataRow> = sqlx::query_as("SELECT template_id, document FROM template_metadata")
      .fetch_all(&self.pool)
      .await?;

    Ok(
      rows
        .into_iter()
        .map(|row| (row.template_id, row.document.0))
        .collect(),
    )
  }
}

async fn insert_instance_row(
  conn: &mut SqliteConnection,
  record: &HistoryRecord,
) -> Result<(), sqlx::Error> {
  sqlx::query(
    r#"
    INSERT INTO workflow_instances (exec_id, template_id, requester, recorded_at, document)
    VALUES (?, ?, ?, ?, ?)
    "#,
  )
  .bind(&record.exec_id)
  .bind(&record.template_id)
  .bind(&record.requester)
  .bind(record.recorded_at)
  .bind(Json(&record.document))
  .execute(conn)
  .await?;

  Ok(())
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
  error
    .as_database_error()
    .is_some_and(|db| db.is_unique_violation())
}

#[async_trait]
impl Store for SqliteStore {
  async fn get_template(
    &self,
    template_id: &str,
    draft: bool,
    with_metadata: bool,
  ) -> Result<Document, Error> {
    let row: TemplateRow = sqlx::query_as(
      r#"
      SELECT template_id, version, draft, document
      FROM workflow_templates
      WHERE template_id = ? AND draft = ?
      "#,
    )
    .bind(template_id)
    .bind(draft)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("template '{}'", template_id)))?;

    let metadata = if with_metadata {
      self.metadata(template_id).await?
    } else {
      None
    };

    Ok(present_template(
      row.document.0,
      row.version,
      row.draft,
      metadata.as_ref(),
      true,
    ))
  }

  async fn list_templates(&self, query: TemplateQuery) -> Result<Vec<Document>, Error> {
    let sql = if query.latest {
      r#"
      SELECT template_id, version, draft, document
      FROM workflow_templates
      WHERE draft = 0
      ORDER BY template_id ASC, version ASC
      "#
    } else {
      r#"
      SELECT template_id, version, draft, document
      FROM workflow_templates
      WHERE draft IS NOT NULL
      ORDER BY template_id ASC, version ASC
      "#
    };
    let rows: Vec<TemplateRow> = sqlx::query_as(sql).fetch_all(&self.pool).await?;

    let metadata = if query.with_metadata {
      self.all_metadata().await?
    } else {
      HashMap::new()
    };

    Ok(
      rows
        .into_iter()
        .map(|row| {
          let meta = metadata.get(&row.template_id);
          present_template(row.document.0, row.version, row.draft, meta, query.full)
        })
        .collect(),
    )
  }

  async fn save_draft(&self, mut template: Document) -> Result<Document, Error> {
    let template_id = template_id_of(&template)?;
    let mut tx = self.pool.begin().await?;

    let published: i64 = sqlx::query_scalar(
      r#"
      SELECT COALESCE(MAX(version), 0)
      FROM workflow_templates
      WHERE template_id = ? AND (draft IS NULL OR draft = 0)
      "#,
    )
    .bind(&template_id)
    .fetch_one(&mut *tx)
    .await?;

    let version = published + 1;
    template.insert("version".to_string(), JsonValue::from(version));
    template.remove("draft");

    sqlx::query("DELETE FROM workflow_templates WHERE template_id = ? AND draft = 1")
      .bind(&template_id)
      .execute(&mut *tx)
      .await?;

    sqlx::query(
      r#"
      INSERT INTO workflow_templates (template_id, version, draft, document)
      VALUES (?, ?, 1, ?)
      "#,
    )
    .bind(&template_id)
    .bind(version)
    .bind(Json(&template))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(template_id = %template_id, version, "saved template draft");

    Ok(present_template(template, version, Some(true), None, true))
  }

  async fn publish_draft(&self, template_id: &str) -> Result<u64, Error> {
    let mut tx = self.pool.begin().await?;

    let version: i64 = sqlx::query_scalar(
      "SELECT version FROM workflow_templates WHERE template_id = ? AND draft = 1",
    )
    .bind(template_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| Error::NotFound(format!("draft of template '{}'", template_id)))?;

    sqlx::query("UPDATE workflow_templates SET draft = NULL WHERE template_id = ? AND draft = 0")
      .bind(template_id)
      .execute(&mut *tx)
      .await?;

    sqlx::query("UPDATE workflow_templates SET draft = 0 WHERE template_id = ? AND draft = 1")
      .bind(template_id)
      .execute(&mut *tx)
      .await?;

    tx.commit().await?;
    tracing::info!(template_id = %template_id, version, "published template");

    Ok(version as u64)
  }

  async fn set_metadata(&self, template_id: &str, metadata: Document) -> Result<(), Error> {
    sqlx::query(
      r#"
      INSERT INTO template_metadata (template_id, document)
      VALUES (?, ?)
      ON CONFLICT (template_id) DO UPDATE SET document = excluded.document
      "#,
    )
    .bind(template_id)
    .bind(Json(&metadata))
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn insert_instance(&self, mut record: HistoryRecord) -> Result<String, Error> {
    let tasks = record.take_tasks();
    let mut tx = self.pool.begin().await?;

    match insert_instance_row(&mut tx, &record).await {
      Err(e) if is_unique_violation(&e) => {
        record.mark_duplicate();
        insert_instance_row(&mut tx, &record).await?;
      }
      result => result?,
    }

    for (position, task) in tasks.iter().enumerate() {
      sqlx::query(
        r#"
        INSERT INTO task_instances (workflow_exec_id, position, document)
        VALUES (?, ?, ?)
        "#,
      )
      .bind(&record.exec_id)
      .bind(position as i64)
      .bind(Json(task))
      .execute(&mut *tx)
      .await?;
    }

    tx.commit().await?;
    Ok(record.exec_id)
  }

  async fn get_instance(&self, exec_id: &str) -> Result<Document, Error> {
    let document: Json<Document> =
      sqlx::query_scalar("SELECT document FROM workflow_instances WHERE exec_id = ?")
        .bind(exec_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("instance '{}'", exec_id)))?;

    let tasks: Vec<Json<JsonValue>> = sqlx::query_scalar(
      r#"
      SELECT document
      FROM task_instances
      WHERE workflow_exec_id = ?
      ORDER BY position ASC
      "#,
    )
    .bind(exec_id)
    .fetch_all(&self.pool)
    .await?;

    let mut document = document.0;
    document.insert(
      "tasks".to_string(),
      JsonValue::Array(tasks.into_iter().map(|task| task.0).collect()),
    );
    Ok(document)
  }

  async fn list_instances(&self, limit: u32) -> Result<Vec<HistoryRecord>, Error> {
    let rows: Vec<InstanceRow> = sqlx::query_as(
      r#"
      SELECT exec_id, template_id, requester, recorded_at, document
      FROM workflow_instances
      ORDER BY recorded_at DESC, rowid DESC
      LIMIT ?
      "#,
    )
    .bind(i64::from(limit))
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(HistoryRecord::from).collect())
  }
}
