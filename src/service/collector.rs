use crate::queue::{TaskQueueManager, RESULTS_QUEUE};
use crate::task::TaskResult;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Default number of results kept for tasks nobody is waiting on yet
pub const DEFAULT_STASH_CAPACITY: usize = 1024;

/// Default age after which an unclaimed result is dropped
pub const DEFAULT_STASH_TTL: Duration = Duration::from_secs(300);

/// Longest single pop when no poll interval is set, so results another
/// waiter stashed are picked up promptly
const MIN_POP_SLICE: Duration = Duration::from_millis(50);

/// What a result wait produced
#[derive(Debug, Clone, PartialEq)]
pub enum ResultOutcome {
    /// The worker's envelope arrived
    Completed(TaskResult),
    /// The deadline passed first; the task may still complete later
    TimedOut,
}

#[derive(Default)]
struct Stash {
    entries: HashMap<String, (Instant, TaskResult)>,
    order: VecDeque<(Instant, String)>,
}

impl Stash {
    fn take(&mut self, task_id: &str) -> Option<TaskResult> {
        self.entries.remove(task_id).map(|(_, result)| result)
    }

    fn insert(&mut self, result: TaskResult, now: Instant) {
        self.order.push_back((now, result.task_id.clone()));
        self.entries.insert(result.task_id.clone(), (now, result));
    }

    fn is_live(&self, stashed_at: &Instant, task_id: &str) -> bool {
        matches!(self.entries.get(task_id), Some((at, _)) if at == stashed_at)
    }

    /// Drop expired entries and the oldest ones beyond `capacity`.
    /// Returns how many results were dropped.
    fn evict(&mut self, now: Instant, ttl: Duration, capacity: usize) -> u64 {
        let mut evicted = 0;
        while let Some((stashed_at, task_id)) = self.order.front() {
            let live = self.is_live(stashed_at, task_id);
            let expired = now.saturating_duration_since(*stashed_at) >= ttl;
            if live && !expired && self.entries.len() <= capacity {
                break;
            }
            if let Some((_, task_id)) = self.order.pop_front() {
                if live {
                    self.entries.remove(&task_id);
                    warn!("Dropping unclaimed result for task {}", task_id);
                    evicted += 1;
                }
            }
        }

        // Claimed entries leave records behind the front; compact them away.
        if self.order.len() > 2 * self.entries.len() + capacity {
            let entries = &self.entries;
            self.order
                .retain(|(at, id)| matches!(entries.get(id), Some((stashed_at, _)) if stashed_at == at));
        }
        evicted
    }
}

/// Polls the `results` queue on behalf of waiting submitters.
///
/// Results are correlated by `task_id`, never by arrival order. Envelopes for
/// other tasks popped along the way are kept for whoever asks for them next,
/// up to a capacity and an age limit; older ones are dropped and counted.
#[derive(Clone)]
pub struct ResultCollector {
    queues: TaskQueueManager,
    poll_interval: Duration,
    capacity: usize,
    ttl: Duration,
    stash: Arc<Mutex<Stash>>,
    evicted: Arc<AtomicU64>,
}

impl ResultCollector {
    /// Create a collector over `queues`
    pub fn new(queues: TaskQueueManager) -> Self {
        Self {
            queues,
            poll_interval: Duration::from_secs(1),
            capacity: DEFAULT_STASH_CAPACITY,
            ttl: DEFAULT_STASH_TTL,
            stash: Arc::new(Mutex::new(Stash::default())),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Longest single pop while waiting; zero falls back to a short slice
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Bound the results kept for tasks nobody is waiting on
    pub fn with_stash_limits(mut self, capacity: usize, ttl: Duration) -> Self {
        self.capacity = capacity;
        self.ttl = ttl;
        self
    }

    /// Results popped for tasks nobody has asked about yet
    pub async fn stashed(&self) -> usize {
        self.stash.lock().await.entries.len()
    }

    /// Unclaimed results dropped for age or capacity
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    async fn claim(&self, task_id: &str) -> Option<TaskResult> {
        let mut stash = self.stash.lock().await;
        let evicted = stash.evict(Instant::now(), self.ttl, self.capacity);
        self.evicted.fetch_add(evicted, Ordering::Relaxed);
        stash.take(task_id)
    }

    async fn keep(&self, result: TaskResult) {
        debug!("Stashing result for task {}", result.task_id);
        let now = Instant::now();
        let mut stash = self.stash.lock().await;
        stash.insert(result, now);
        let evicted = stash.evict(now, self.ttl, self.capacity);
        self.evicted.fetch_add(evicted, Ordering::Relaxed);
    }

    /// Wait up to `deadline` for the result of `task_id`
    pub async fn await_result(&self, task_id: &str, deadline: Duration) -> ResultOutcome {
        let until = Instant::now() + deadline;
        let slice = if self.poll_interval.is_zero() {
            MIN_POP_SLICE
        } else {
            self.poll_interval
        };

        loop {
            if let Some(result) = self.claim(task_id).await {
                return ResultOutcome::Completed(result);
            }

            let remaining = until.saturating_duration_since(Instant::now());
            let wait = remaining.min(slice);

            let polled_at = Instant::now();
            if let Some(result) = self.queues.pop::<TaskResult>(RESULTS_QUEUE, wait).await {
                if result.task_id == task_id {
                    return ResultOutcome::Completed(result);
                }
                self.keep(result).await;
                continue;
            }

            if remaining.is_zero() {
                warn!("Timed out waiting for result of task {}", task_id);
                return ResultOutcome::TimedOut;
            }
            // A failing store answers instantly; don't spin on it.
            sleep_until(polled_at + wait).await;
        }
    }
}
