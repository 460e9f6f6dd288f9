//! Nyuki Workflow
//!
//! Data model shared by every part of the workflow service:
//! - [`Template`]: an immutable workflow definition loaded from storage
//! - [`LiveReport`]: the execution state an engine reports for one instance
//! - [`Report`]: the merge of both, as sent to subscribers and stored in history
//! - [`ExecMeta`]: allow-listed caller metadata attached to an instance
//! - [`Value`]: the dynamic value tree used for live data, with sanitization
//! - [`WorkflowUri`]: the `nyuki://` addressing scheme

mod error;
mod exec_meta;
mod report;
mod template;
mod uri;
mod value;

pub use error::WorkflowError;
pub use exec_meta::{ExecKey, ExecMeta};
pub use report::{LiveReport, Report, deep_merge};
pub use template::{Document, Template, TemplateRef};
pub use uri::{InvalidWorkflowUri, WorkflowRef, WorkflowUri};
pub use value::{Map, Opaque, Value};
