//! Submission boundary
//!
//! Everything a front door (HTTP, CLI, ...) needs: hand a task to the load
//! balancer, report queue depths and worker health, and wait for a result
//! with a deadline.

mod collector;

pub use collector::{ResultCollector, ResultOutcome, DEFAULT_STASH_CAPACITY, DEFAULT_STASH_TTL};

use crate::balancer::LoadBalancer;
use crate::queue::{worker_queue, QueueMetrics, TaskQueueManager, RESULTS_QUEUE, TASKS_QUEUE};
use crate::task::Task;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Acknowledgement for an accepted task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    /// Id of the accepted task (assigned if the caller left it empty)
    pub task_id: String,
    /// Worker queue the task was routed to
    pub worker: usize,
    /// Acceptance time
    pub accepted_at: DateTime<Utc>,
}

/// Aggregate health verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every worker queue is under the threshold
    Healthy,
    /// At least one worker queue is at or over the threshold
    Degraded,
}

/// Health report for front doors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall verdict
    pub status: HealthStatus,
    /// Per-worker flags, indexed by worker id
    pub worker_status: Vec<bool>,
}

/// Queue depths and traffic counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMetrics {
    /// Depth of the shared `tasks` queue
    pub tasks_pending: usize,
    /// Depth of the `results` queue
    pub results_pending: usize,
    /// Depth of each worker queue
    pub worker_queues: Vec<usize>,
    /// Traffic counters of this service's queue manager
    pub queue: QueueMetrics,
    /// Results held for tasks nobody is waiting on yet
    pub results_stashed: usize,
    /// Unclaimed results dropped for age or capacity
    pub results_evicted: u64,
}

/// Front-door facing API over the balancer and the queues
#[derive(Clone)]
pub struct SubmissionService {
    queues: TaskQueueManager,
    balancer: LoadBalancer,
    collector: ResultCollector,
}

impl SubmissionService {
    /// Create a service routing over `balancer`'s worker queues
    pub fn new(queues: TaskQueueManager, balancer: LoadBalancer) -> Self {
        let collector = ResultCollector::new(queues.clone());
        Self {
            queues,
            balancer,
            collector,
        }
    }

    /// Use a custom poll interval while waiting for results
    pub fn with_result_poll(mut self, interval: Duration) -> Self {
        self.collector = self.collector.with_poll_interval(interval);
        self
    }

    /// Bound the results kept for tasks nobody is waiting on
    pub fn with_result_stash(mut self, capacity: usize, ttl: Duration) -> Self {
        self.collector = self.collector.with_stash_limits(capacity, ttl);
        self
    }

    /// Accept a task and route it to the least-loaded worker.
    ///
    /// Fails only if the store cannot take the task.
    pub async fn submit(&self, mut task: Task) -> crate::Result<Receipt> {
        if task.id.is_empty() {
            task.id = Uuid::new_v4().to_string();
        }

        let worker = self.balancer.distribute(&task).await?;
        info!("Task {} ({}) accepted for worker {}", task.id, task.task_type, worker);

        Ok(Receipt {
            task_id: task.id,
            worker,
            accepted_at: Utc::now(),
        })
    }

    /// Depth of any named queue
    pub async fn queue_length(&self, name: &str) -> usize {
        self.queues.length(name).await
    }

    /// Per-worker health flags
    pub async fn worker_health(&self) -> Vec<bool> {
        self.balancer.health_check().await
    }

    /// Aggregate health: healthy only if every worker is
    pub async fn health(&self) -> HealthReport {
        let worker_status = self.worker_health().await;
        let status = if worker_status.iter().all(|healthy| *healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        HealthReport {
            status,
            worker_status,
        }
    }

    /// Queue depths plus traffic counters
    pub async fn metrics(&self) -> ServiceMetrics {
        let mut worker_queues = Vec::with_capacity(self.balancer.worker_count());
        for id in 0..self.balancer.worker_count() {
            worker_queues.push(self.queues.length(&worker_queue(id)).await);
        }

        ServiceMetrics {
            tasks_pending: self.queues.length(TASKS_QUEUE).await,
            results_pending: self.queues.length(RESULTS_QUEUE).await,
            worker_queues,
            queue: self.queues.metrics(),
            results_stashed: self.collector.stashed().await,
            results_evicted: self.collector.evicted(),
        }
    }

    /// Wait up to `deadline` for the result of `task_id`
    pub async fn await_result(&self, task_id: &str, deadline: Duration) -> ResultOutcome {
        self.collector.await_result(task_id, deadline).await
    }
}
