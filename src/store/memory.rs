//! Memory

use crate::store::QueueStore;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// In-memory queue store.
///
/// Lists live as long as the store value (or any clone of it). Every list has
/// its own [`Notify`] so blocked pops wake up as soon as a push lands.
#[derive(Clone, Default)]
pub struct MemoryStore {
    queues: Arc<Mutex<HashMap<String, Slot>>>,
}

#[derive(Default)]
struct Slot {
    entries: VecDeque<String>,
    notify: Arc<Notify>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    async fn notifier(&self, queue: &str) -> Arc<Notify> {
        let mut queues = self.queues.lock().await;
        Arc::clone(&queues.entry(queue.to_string()).or_default().notify)
    }

    async fn try_pop(&self, queue: &str) -> Option<String> {
        let mut queues = self.queues.lock().await;
        queues.get_mut(queue).and_then(|slot| slot.entries.pop_back())
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn push(&self, queue: &str, entry: String) -> crate::Result<usize> {
        let mut queues = self.queues.lock().await;
        let slot = queues.entry(queue.to_string()).or_default();
        slot.entries.push_front(entry);
        let len = slot.entries.len();
        slot.notify.notify_waiters();
        debug!("Pushed entry to {} (length {})", queue, len);
        Ok(len)
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> crate::Result<Option<String>> {
        let deadline = Instant::now() + timeout;

        loop {
            let notify = self.notifier(queue).await;

            // Register interest before checking, so a push between the check
            // and the wait still wakes us.
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(entry) = self.try_pop(queue).await {
                debug!("Popped entry from {}", queue);
                return Ok(Some(entry));
            }

            if Instant::now() >= deadline || timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self, queue: &str) -> crate::Result<usize> {
        let queues = self.queues.lock().await;
        Ok(queues.get(queue).map_or(0, |slot| slot.entries.len()))
    }

    async fn range(&self, queue: &str, start: usize, count: usize) -> crate::Result<Vec<String>> {
        let queues = self.queues.lock().await;
        Ok(queues
            .get(queue)
            .map(|slot| slot.entries.iter().skip(start).take(count).cloned().collect())
            .unwrap_or_default())
    }

    async fn ping(&self) -> bool {
        true
    }
}
