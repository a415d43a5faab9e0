//! Ticket Dispatch - queue-based task distribution for customer-service requests
//!
//! Incoming requests become [`Task`]s that a [`LoadBalancer`] spreads across
//! per-worker queues. A pool of [`Worker`]s pops tasks, dispatches them to the
//! handler registered for their type and publishes a [`TaskResult`] envelope
//! on the `results` queue. All coordination goes through a shared
//! [`QueueStore`](store::QueueStore).

/// Least-loaded routing across worker queues
pub mod balancer;
/// Configuration management
pub mod config;
/// Typed task/result queues on top of a queue store
pub mod queue;
/// Submission boundary used by front doors
pub mod service;
/// Shared named-list stores
pub mod store;
/// Task and result definitions, handler dispatch
pub mod task;
/// Worker loop and worker pool
pub mod worker;

pub use balancer::LoadBalancer;
pub use config::Config;
pub use queue::TaskQueueManager;
pub use service::SubmissionService;
pub use store::memory::MemoryStore;
pub use task::{Task, TaskResult, TaskType};
pub use worker::pool::WorkerPool;
pub use worker::Worker;

use thiserror::Error;

/// Result type for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Error types for the dispatch system
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The queue store could not be reached
    #[error("Queue store unavailable: {0}")]
    StoreUnavailable(String),

    /// A raw queue entry could not be decoded
    #[error("Malformed entry: {0}")]
    MalformedEntry(String),

    /// No handler is registered for the task type
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    /// A handler returned an error or panicked
    #[error("Handler failure: {0}")]
    HandlerFailure(String),

    /// A handler did not finish within its time budget
    #[error("Handler timed out: {0}")]
    HandlerTimeout(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Worker pool encountered an error
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// A worker loop died outside of task handling
    #[error("Worker {0} crashed")]
    WorkerCrashed(usize),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
