//! Waystone Cache — TTL'd key-value cache with an advisory lock.
//!
//! [`StateCache`] fronts the durable repository with namespaced,
//! TTL-bounded entries and offers the subsystem's only mutual-exclusion
//! primitive: a self-expiring advisory lock. The transport lives behind
//! the [`CacheBackend`] port; [`InMemoryBackend`] serves single-process
//! deployments and tests.

pub mod backend;
pub mod memory;
pub mod state_cache;

pub use backend::CacheBackend;
pub use memory::InMemoryBackend;
pub use state_cache::{CacheConfig, StateCache};
