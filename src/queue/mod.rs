//! Typed task/result queues
//!
//! [`TaskQueueManager`] wraps a [`QueueStore`] and moves JSON-encoded
//! [`Task`](crate::task::Task) and [`TaskResult`](crate::task::TaskResult)
//! records in and out of named queues. Writes are strict, reads are lenient:
//! a failed push is an error, while a failed pop or length query degrades to
//! "nothing there" so consumers stay up.

use crate::store::QueueStore;
use crate::DispatchError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Shared inbox every worker can pull from
pub const TASKS_QUEUE: &str = "tasks";

/// Queue where workers publish result envelopes
pub const RESULTS_QUEUE: &str = "results";

/// Name of the dedicated queue for worker `id`
pub fn worker_queue(id: usize) -> String {
    format!("worker_{id}")
}

/// Snapshot of queue traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMetrics {
    /// Entries successfully pushed
    pub pushed: u64,
    /// Entries popped and decoded
    pub popped: u64,
    /// Popped entries dropped because they did not decode
    pub malformed_discarded: u64,
    /// Store failures absorbed by `pop` or `length`
    pub read_errors: u64,
}

#[derive(Default)]
struct Counters {
    pushed: AtomicU64,
    popped: AtomicU64,
    malformed_discarded: AtomicU64,
    read_errors: AtomicU64,
}

/// Typed push/pop/length over a shared queue store
#[derive(Clone)]
pub struct TaskQueueManager {
    store: Arc<dyn QueueStore>,
    counters: Arc<Counters>,
}

impl TaskQueueManager {
    /// Create a manager over `store`
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    /// Serialize `entry` and push it, returning the new queue length.
    ///
    /// Never drops an entry silently: store failures come back as
    /// [`StoreUnavailable`](crate::DispatchError::StoreUnavailable).
    pub async fn push<T: Serialize>(&self, queue: &str, entry: &T) -> crate::Result<usize> {
        let raw = serde_json::to_string(entry)?;
        match self.store.push(queue, raw).await {
            Ok(len) => {
                self.counters.pushed.fetch_add(1, Ordering::Relaxed);
                debug!("Entry pushed to queue {} (length {})", queue, len);
                Ok(len)
            }
            Err(e) => {
                error!("Error pushing to queue {}: {}", queue, e);
                Err(e)
            }
        }
    }

    /// Pop the oldest entry, waiting at most `timeout`.
    ///
    /// Returns `None` on timeout, on store failure, and for entries that do
    /// not decode as `T` (those are discarded and counted).
    pub async fn pop<T: DeserializeOwned>(&self, queue: &str, timeout: Duration) -> Option<T> {
        let raw = match self.store.pop(queue, timeout).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                self.counters.read_errors.fetch_add(1, Ordering::Relaxed);
                error!("Error popping from queue {}: {}", queue, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => {
                self.counters.popped.fetch_add(1, Ordering::Relaxed);
                debug!("Entry popped from queue {}", queue);
                Some(entry)
            }
            Err(e) => {
                self.counters
                    .malformed_discarded
                    .fetch_add(1, Ordering::Relaxed);
                let err = DispatchError::MalformedEntry(e.to_string());
                warn!("Discarding entry from queue {}: {}", queue, err);
                None
            }
        }
    }

    /// Current length of `queue`; 0 if the store cannot answer
    pub async fn length(&self, queue: &str) -> usize {
        match self.store.len(queue).await {
            Ok(len) => len,
            Err(e) => {
                self.counters.read_errors.fetch_add(1, Ordering::Relaxed);
                error!("Error getting length of queue {}: {}", queue, e);
                0
            }
        }
    }

    /// Up to `count` of the newest entries that decode as `T`
    pub async fn recent<T: DeserializeOwned>(&self, queue: &str, count: usize) -> Vec<T> {
        match self.store.range(queue, 0, count).await {
            Ok(raw) => raw
                .iter()
                .filter_map(|entry| serde_json::from_str(entry).ok())
                .collect(),
            Err(e) => {
                self.counters.read_errors.fetch_add(1, Ordering::Relaxed);
                error!("Error reading queue {}: {}", queue, e);
                Vec::new()
            }
        }
    }

    /// Check if the store is reachable
    pub async fn ping(&self) -> bool {
        self.store.ping().await
    }

    /// Traffic counters since this manager (or any clone) was created
    pub fn metrics(&self) -> QueueMetrics {
        QueueMetrics {
            pushed: self.counters.pushed.load(Ordering::Relaxed),
            popped: self.counters.popped.load(Ordering::Relaxed),
            malformed_discarded: self.counters.malformed_discarded.load(Ordering::Relaxed),
            read_errors: self.counters.read_errors.load(Ordering::Relaxed),
        }
    }
}
