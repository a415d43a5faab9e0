/// Worker pool implementation
pub mod pool;

use crate::queue::{worker_queue, TaskQueueManager, RESULTS_QUEUE, TASKS_QUEUE};
use crate::task::executor::TaskExecutor;
use crate::task::{Task, TaskResult};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Attempts at publishing a result before the envelope is given up
const PUBLISH_ATTEMPTS: u32 = 3;

/// Pause before the first publish retry; doubles on each further retry
const PUBLISH_BACKOFF: Duration = Duration::from_millis(100);

/// Which queue a worker consumes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerSource {
    /// The shared `tasks` queue
    #[default]
    Shared,
    /// The worker's own `worker_{id}` queue, fed by the load balancer
    Assigned,
}

/// Polling behaviour of the worker loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Longest a single pop waits for an entry
    pub pop_timeout: Duration,
    /// Pause after an empty pop before trying again
    pub idle_interval: Duration,
}

impl PollConfig {
    /// No waiting at all; handy for driving workers step by step
    pub const IMMEDIATE: PollConfig = PollConfig {
        pop_timeout: Duration::ZERO,
        idle_interval: Duration::ZERO,
    };
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            pop_timeout: Duration::from_secs(1),
            idle_interval: Duration::from_millis(100),
        }
    }
}

/// Lifecycle of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed, loop not entered yet
    Created,
    /// Poll loop active
    Running,
    /// Loop exited after a stop signal
    Stopped,
    /// Loop died on something other than a task
    Crashed,
}

/// Per-worker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Tasks turned into results
    pub processed: u64,
    /// Of those, results carrying an error
    pub failed: u64,
    /// Results given up after every publish attempt failed
    pub publish_errors: u64,
    /// Publish attempts repeated after a store failure
    pub publish_retries: u64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
    publish_errors: AtomicU64,
    publish_retries: AtomicU64,
}

/// External handle on a worker: observe its state, ask it to stop
#[derive(Clone)]
pub struct WorkerControl {
    id: usize,
    running: Arc<AtomicBool>,
    state: watch::Receiver<WorkerState>,
    counters: Arc<Counters>,
}

impl WorkerControl {
    /// Worker identity
    pub fn id(&self) -> usize {
        self.id
    }

    /// Clear the running flag; the loop exits at its next iteration
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check the running flag
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Wait until the worker reaches `target`
    pub async fn wait_for(&mut self, target: WorkerState) -> WorkerState {
        let _ = self.state.wait_for(|state| *state == target).await;
        *self.state.borrow()
    }

    /// Counter snapshot
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            publish_errors: self.counters.publish_errors.load(Ordering::Relaxed),
            publish_retries: self.counters.publish_retries.load(Ordering::Relaxed),
        }
    }
}

/// A worker that turns tasks into results
pub struct Worker {
    id: usize,
    queues: TaskQueueManager,
    executor: TaskExecutor,
    source: WorkerSource,
    poll: PollConfig,
    running: Arc<AtomicBool>,
    state: watch::Sender<WorkerState>,
    counters: Arc<Counters>,
}

impl Worker {
    /// Create a worker with the given identity
    pub fn new(id: usize, queues: TaskQueueManager, executor: TaskExecutor) -> Self {
        let (state, _) = watch::channel(WorkerState::Created);
        Self {
            id,
            queues,
            executor,
            source: WorkerSource::default(),
            poll: PollConfig::default(),
            running: Arc::new(AtomicBool::new(false)),
            state,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Consume from `source` instead of the shared queue
    pub fn with_source(mut self, source: WorkerSource) -> Self {
        self.source = source;
        self
    }

    /// Use custom polling timings
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Worker identity
    pub fn id(&self) -> usize {
        self.id
    }

    /// Name of the queue this worker pops from
    pub fn source_queue(&self) -> String {
        match self.source {
            WorkerSource::Shared => TASKS_QUEUE.to_string(),
            WorkerSource::Assigned => worker_queue(self.id),
        }
    }

    /// Handle for stopping and observing this worker
    pub fn control(&self) -> WorkerControl {
        WorkerControl {
            id: self.id,
            running: Arc::clone(&self.running),
            state: self.state.subscribe(),
            counters: Arc::clone(&self.counters),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Run the poll loop until stopped.
    ///
    /// Task-level failures never end the loop. Only a panic outside handler
    /// dispatch does, leaving the worker `Crashed`.
    pub async fn run(&self) -> crate::Result<()> {
        self.begin();
        self.serve().await
    }

    /// Enter `Running` without polling yet, so a stop issued right after
    /// spawning is not overwritten by the loop starting up.
    pub(crate) fn begin(&self) {
        self.running.store(true, Ordering::SeqCst);
        self.state.send_replace(WorkerState::Running);
    }

    pub(crate) async fn serve(&self) -> crate::Result<()> {
        let source = self.source_queue();
        info!("Worker {} started, watching queue {}", self.id, source);

        while self.running.load(Ordering::SeqCst) {
            match AssertUnwindSafe(self.run_once(&source)).catch_unwind().await {
                Ok(true) => {}
                Ok(false) => {
                    if !self.poll.idle_interval.is_zero() {
                        sleep(self.poll.idle_interval).await;
                    } else {
                        tokio::task::yield_now().await;
                    }
                }
                Err(_) => {
                    error!("Worker {} loop panicked", self.id);
                    self.running.store(false, Ordering::SeqCst);
                    self.state.send_replace(WorkerState::Crashed);
                    return Err(crate::DispatchError::WorkerCrashed(self.id));
                }
            }
        }

        self.state.send_replace(WorkerState::Stopped);
        info!("Worker {} stopped", self.id);
        Ok(())
    }

    /// One iteration: pop, process, publish. Returns false if nothing was popped.
    pub async fn run_once(&self, source: &str) -> bool {
        let task: Task = match self.queues.pop(source, self.poll.pop_timeout).await {
            Some(task) => task,
            None => return false,
        };

        info!("Worker {} processing task {}", self.id, task.id);
        let result = self.process(&task).await;
        self.publish(&result).await;
        true
    }

    /// Dispatch `task` and stamp the envelope with this worker's identity
    pub async fn process(&self, task: &Task) -> TaskResult {
        let result = self.executor.execute(task, self.id).await;
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        if result.is_error() {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn publish(&self, result: &TaskResult) {
        let mut backoff = PUBLISH_BACKOFF;
        for attempt in 1..=PUBLISH_ATTEMPTS {
            match self.queues.push(RESULTS_QUEUE, result).await {
                Ok(_) => {
                    info!("Worker {} completed task {}", self.id, result.task_id);
                    return;
                }
                Err(e) if attempt < PUBLISH_ATTEMPTS => {
                    self.counters.publish_retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Worker {} failed to publish result for task {} (attempt {}): {}",
                        self.id, result.task_id, attempt, e
                    );
                    sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    self.counters.publish_errors.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "Worker {} gave up on result for task {} after {} attempts: {}",
                        self.id, result.task_id, PUBLISH_ATTEMPTS, e
                    );
                }
            }
        }
    }
}
