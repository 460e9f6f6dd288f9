//! Nyuki Engine
//!
//! The workflow service does not execute tasks itself. This crate defines the
//! contract it expects from the execution engine that does:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Engine                            │
//! │  - load(template)                                        │
//! │  - select(topic) -> [TemplateRef]                        │
//! │  - data_received(payload, topic) -> [Instance]           │
//! │  - run_once(template, payload) -> Instance               │
//! │  - register_notifier(notifier)                           │
//! └──────────────────────────────────────────────────────────┘
//!                               │ ExecEvent
//!                               ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                   ExecutionNotifier                      │
//! │  - notify(event), strictly ordered per instance          │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod engine;
mod events;

pub use engine::{Engine, EngineError, Instance};
pub use events::{
  ChannelNotifier, EventSource, ExecEvent, ExecutionNotifier, NoopNotifier, Transition,
};
