//! Nyuki Orchestrator
//!
//! Tracks the lifecycle of running workflow instances and keeps every sink
//! consistent with the in-process registry:
//!
//! ```text
//! InboundBus ──► TriggerBinding ──► Engine (external)
//!                      │                  │ ExecEvent
//!                      ▼                  ▼
//!                  Registry ◄──────── router::route
//!                                         │
//!        ┌──────────────┬─────────────────┼──────────────────┐
//!        ▼              ▼                 ▼                  ▼
//!    CacheSync   HistoryRecorder  GlobalBroadcaster  instance channel
//! ```
//!
//! [`WorkflowService`] owns all of it and processes one event at a time.
//! Cache and history writes run as fire-and-forget [`FanOut`] actions.

mod bus;
mod error;
mod fanout;
mod global;
mod history;
mod payload;
mod recovery;
mod registry;
mod reporting;
mod router;
mod service;
mod sinks;
mod trigger;

pub use bus::{InboundBus, InboundEvent, MemoryBus};
pub use error::OrchestratorError;
pub use fanout::FanOut;
pub use global::GlobalBroadcaster;
pub use history::HistoryRecorder;
pub use payload::ExecPayload;
pub use recovery::{RecoveryReport, TemplateRecovery};
pub use registry::{Lifecycle, Registry, RunningWorkflow};
pub use reporting::{ErrorReporter, LogReporter};
pub use router::route;
pub use service::{ServiceDeps, ServiceHandle, WorkflowService};
pub use sinks::Sinks;
pub use trigger::TriggerBinding;
