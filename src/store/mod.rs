//! Shared named-list stores
//!
//! A queue store holds any number of named lists of raw (already serialized)
//! entries. Entries are pushed at the head and popped from the tail, so each
//! list behaves as a FIFO queue. Single-entry operations are atomic: a pop
//! never observes a partial entry and two concurrent pops never return the
//! same one.

/// In-process store
pub mod memory;
/// Redis-backed store
#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;
use std::time::Duration;

/// Trait for queue store implementations
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Push an entry at the head of the named list, returning the new length
    async fn push(&self, queue: &str, entry: String) -> crate::Result<usize>;

    /// Pop the oldest entry, waiting at most `timeout` for one to arrive.
    ///
    /// A zero timeout never blocks. `Ok(None)` means nothing arrived in time.
    async fn pop(&self, queue: &str, timeout: Duration) -> crate::Result<Option<String>>;

    /// Current length of the named list
    async fn len(&self, queue: &str) -> crate::Result<usize>;

    /// Up to `count` entries starting `start` positions from the newest one
    async fn range(&self, queue: &str, start: usize, count: usize) -> crate::Result<Vec<String>>;

    /// Check if the store is reachable
    async fn ping(&self) -> bool;
}

/// Open the store selected by `config`
pub async fn open(config: &crate::Config) -> crate::Result<std::sync::Arc<dyn QueueStore>> {
    match config.store_backend {
        crate::config::StoreBackend::Memory => Ok(std::sync::Arc::new(memory::MemoryStore::new())),
        #[cfg(feature = "redis")]
        crate::config::StoreBackend::Redis => Ok(std::sync::Arc::new(
            self::redis::RedisStore::connect(&config.redis_url).await?,
        )),
        #[cfg(not(feature = "redis"))]
        crate::config::StoreBackend::Redis => Err(crate::DispatchError::Config(
            "Redis backend requires the `redis` feature".to_string(),
        )),
    }
}
