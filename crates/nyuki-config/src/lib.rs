//! Nyuki Config
//!
//! This crate contains the serializable configuration of a workflow service.
//! Configuration is loaded from a JSON file, validated, and handed to the
//! service at startup or on reload.
//!
//! ```json
//! {
//!   "holder": "workflow",
//!   "service": "acme",
//!   "storage": { "url": "sqlite://nyuki.db" },
//!   "topics": ["alerts"],
//!   "cache": { "backend": "memory" }
//! }
//! ```

mod service;

pub use service::{
  CacheBackend, CacheConfig, CacheSetting, ConfigError, DEFAULT_CHANNEL_CAPACITY, ServiceConfig,
  StorageConfig,
};
