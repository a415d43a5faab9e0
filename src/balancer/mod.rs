//! Least-loaded routing
//!
//! The balancer keeps no state of its own: every decision is made from a
//! fresh snapshot of worker queue depths. Reading the depths and pushing the
//! task are two separate store calls, so concurrent submitters may observe
//! the same minimum and pile onto one worker. That only costs balance, not
//! correctness.

use crate::queue::{worker_queue, TaskQueueManager};
use crate::task::Task;
use tracing::{debug, warn};

/// Queue depth at or above which a worker counts as unhealthy
pub const DEFAULT_HEALTH_THRESHOLD: usize = 1000;

/// Index of the first minimum in `lengths` (0 for an empty slice)
pub fn least_loaded(lengths: &[usize]) -> usize {
    lengths
        .iter()
        .enumerate()
        .min_by_key(|&(idx, len)| (*len, idx))
        .map_or(0, |(idx, _)| idx)
}

/// Spreads tasks over the per-worker queues `worker_0..worker_{N-1}`
#[derive(Clone)]
pub struct LoadBalancer {
    queues: TaskQueueManager,
    worker_count: usize,
    health_threshold: usize,
}

impl LoadBalancer {
    /// Create a balancer for `worker_count` workers
    pub fn new(queues: TaskQueueManager, worker_count: usize) -> Self {
        Self {
            queues,
            worker_count,
            health_threshold: DEFAULT_HEALTH_THRESHOLD,
        }
    }

    /// Override the health high-water mark
    pub fn with_health_threshold(mut self, threshold: usize) -> Self {
        self.health_threshold = threshold;
        self
    }

    /// Number of worker queues
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Health high-water mark
    pub fn health_threshold(&self) -> usize {
        self.health_threshold
    }

    /// Depth of every worker queue, in worker order
    pub async fn worker_lengths(&self) -> Vec<usize> {
        let mut lengths = Vec::with_capacity(self.worker_count);
        for id in 0..self.worker_count {
            lengths.push(self.queues.length(&worker_queue(id)).await);
        }
        lengths
    }

    /// Push `task` to the shortest worker queue and return that worker's index
    pub async fn distribute(&self, task: &Task) -> crate::Result<usize> {
        if self.worker_count == 0 {
            return Err(crate::DispatchError::WorkerPool(
                "no worker queues to distribute to".to_string(),
            ));
        }

        let lengths = self.worker_lengths().await;
        let target = least_loaded(&lengths);
        self.queues.push(&worker_queue(target), task).await?;

        debug!(
            "Task {} routed to worker {} (depths {:?})",
            task.id, target, lengths
        );
        Ok(target)
    }

    /// One flag per worker: true while its queue is below the threshold
    pub async fn health_check(&self) -> Vec<bool> {
        let health: Vec<bool> = self
            .worker_lengths()
            .await
            .into_iter()
            .map(|len| len < self.health_threshold)
            .collect();

        if health.iter().any(|healthy| !healthy) {
            warn!("Worker queues over threshold {}: {:?}", self.health_threshold, health);
        }
        health
    }
}
