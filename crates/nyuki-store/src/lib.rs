//! Nyuki Store
//!
//! This crate provides the storage trait and implementations for workflow
//! templates and workflow history. Data is persisted to SQLite, or kept in
//! memory for tests and ephemeral setups.
//!
//! The [`Store`] trait defines operations for:
//! - Reading published and draft templates, with their metadata
//! - Saving and publishing template drafts
//! - Recording and querying the history of finished instances

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{HistoryRecord, TemplateQuery};

use async_trait::async_trait;
use nyuki_workflow::Document;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A document is missing a field storage relies on.
  #[error("invalid document: {0}")]
  Invalid(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Applying migrations failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Storage trait for workflow templates and history.
#[async_trait]
pub trait Store: Send + Sync {
  /// Get the latest published template, or its draft when `draft` is set.
  async fn get_template(
    &self,
    template_id: &str,
    draft: bool,
    with_metadata: bool,
  ) -> Result<Document, Error>;

  /// List stored templates, ordered by identifier.
  async fn list_templates(&self, query: TemplateQuery) -> Result<Vec<Document>, Error>;

  /// Create or replace the draft of a template.
  ///
  /// The draft's version is one past the last published version. Returns the
  /// stored document.
  async fn save_draft(&self, template: Document) -> Result<Document, Error>;

  /// Archive the latest published version and promote the draft in its place.
  ///
  /// Returns the published version.
  async fn publish_draft(&self, template_id: &str) -> Result<u64, Error>;

  /// Create or replace the metadata (title, tags, ...) of a template.
  async fn set_metadata(&self, template_id: &str, metadata: Document) -> Result<(), Error>;

  /// Record a finished instance.
  ///
  /// An exec id that is already recorded is not overwritten: the record is
  /// stored under a fresh id with `exec.duplicate` pointing at the original.
  /// Returns the id the record was stored under.
  async fn insert_instance(&self, record: HistoryRecord) -> Result<String, Error>;

  /// Get a recorded instance with its tasks.
  async fn get_instance(&self, exec_id: &str) -> Result<Document, Error>;

  /// List recorded instances without their tasks, newest first.
  async fn list_instances(&self, limit: u32) -> Result<Vec<HistoryRecord>, Error>;
}
