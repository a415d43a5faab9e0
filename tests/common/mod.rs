#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use ticket_dispatch::store::QueueStore;
use ticket_dispatch::task::executor::TaskExecutor;
use ticket_dispatch::task::handler::HandlerRegistry;
use ticket_dispatch::{DispatchError, MemoryStore, TaskQueueManager};

/// Store whose every call fails, as if the server were down
pub struct FailingStore;

#[async_trait]
impl QueueStore for FailingStore {
    async fn push(&self, _queue: &str, _entry: String) -> ticket_dispatch::Result<usize> {
        Err(DispatchError::StoreUnavailable("connection refused".to_string()))
    }

    async fn pop(&self, _queue: &str, _timeout: Duration) -> ticket_dispatch::Result<Option<String>> {
        Err(DispatchError::StoreUnavailable("connection refused".to_string()))
    }

    async fn len(&self, _queue: &str) -> ticket_dispatch::Result<usize> {
        Err(DispatchError::StoreUnavailable("connection refused".to_string()))
    }

    async fn range(&self, _queue: &str, _start: usize, _count: usize) -> ticket_dispatch::Result<Vec<String>> {
        Err(DispatchError::StoreUnavailable("connection refused".to_string()))
    }

    async fn ping(&self) -> bool {
        false
    }
}

/// In-memory store whose first `failures` pushes to one queue are refused
pub struct FlakyStore {
    inner: MemoryStore,
    queue: &'static str,
    failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(queue: &'static str, failures: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            queue,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl QueueStore for FlakyStore {
    async fn push(&self, queue: &str, entry: String) -> ticket_dispatch::Result<usize> {
        if queue == self.queue
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(DispatchError::StoreUnavailable("connection reset".to_string()));
        }
        self.inner.push(queue, entry).await
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> ticket_dispatch::Result<Option<String>> {
        self.inner.pop(queue, timeout).await
    }

    async fn len(&self, queue: &str) -> ticket_dispatch::Result<usize> {
        self.inner.len(queue).await
    }

    async fn range(&self, queue: &str, start: usize, count: usize) -> ticket_dispatch::Result<Vec<String>> {
        self.inner.range(queue, start, count).await
    }

    async fn ping(&self) -> bool {
        self.inner.ping().await
    }
}

/// Manager over a fresh in-memory store, plus the store for raw access
pub fn memory_queues() -> (Arc<MemoryStore>, TaskQueueManager) {
    let store = Arc::new(MemoryStore::new());
    let queues = TaskQueueManager::new(store.clone());
    (store, queues)
}

/// Executor with the stock handlers
pub fn default_executor() -> TaskExecutor {
    TaskExecutor::new(HandlerRegistry::with_defaults(), Duration::from_secs(5))
}
