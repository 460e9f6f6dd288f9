//! Nyuki Cache
//!
//! Reports of running instances are mirrored into an ephemeral key/value
//! cache so that other processes can read them without going through the
//! service. The cache is an optimization: every failure is logged and
//! otherwise ignored.
//!
//! - [`Cache`]: the key/value contract (`set` with TTL and create-only mode)
//! - [`CacheConnector`]: opens a [`Cache`] from configuration
//! - [`CacheSync`]: writes and deletes report snapshots under namespaced keys

mod cache;
mod memory;
mod sync;

pub use cache::{Cache, CacheConnector, CacheError, SetMode};
pub use memory::{MemoryCache, MemoryConnector};
pub use sync::{CacheSync, ENTRY_TTL};
