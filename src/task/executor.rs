//! Executor

use crate::task::handler::HandlerRegistry;
use crate::task::{Task, TaskResult};
use crate::DispatchError;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Runs tasks against a handler registry, always producing a result envelope
#[derive(Clone)]
pub struct TaskExecutor {
    registry: HandlerRegistry,
    timeout_duration: Duration,
}

impl TaskExecutor {
    /// Create an executor with a per-task time budget
    pub fn new(registry: HandlerRegistry, timeout_duration: Duration) -> Self {
        Self {
            registry,
            timeout_duration,
        }
    }

    /// Handlers known to this executor
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Execute `task` on behalf of `worker_id`.
    ///
    /// Unknown types, handler errors, panics and timeouts all yield an
    /// error result; nothing escapes to the caller.
    pub async fn execute(&self, task: &Task, worker_id: usize) -> TaskResult {
        let handler = match self.registry.get(&task.task_type) {
            Some(handler) => handler,
            None => {
                let err = DispatchError::UnknownTaskType(task.task_type.to_string());
                warn!("Worker {} cannot process task {}: {}", worker_id, task.id, err);
                return TaskResult::failure(task, worker_id, err);
            }
        };

        let call = AssertUnwindSafe(handler.handle(&task.data)).catch_unwind();

        match timeout(self.timeout_duration, call).await {
            Ok(Ok(Ok(output))) => {
                info!("Task {} ({}) completed", task.id, task.task_type);
                TaskResult::success(task, worker_id, output)
            }
            Ok(Ok(Err(e))) => {
                let err = match e {
                    e @ DispatchError::HandlerFailure(_) => e,
                    other => DispatchError::HandlerFailure(other.to_string()),
                };
                error!("Task {} failed: {}", task.id, err);
                TaskResult::failure(task, worker_id, err)
            }
            Ok(Err(_)) => {
                let err = DispatchError::HandlerFailure(format!(
                    "handler for {} panicked",
                    task.task_type
                ));
                error!("Task {} failed: {}", task.id, err);
                TaskResult::failure(task, worker_id, err)
            }
            Err(_) => {
                let err = DispatchError::HandlerTimeout(format!(
                    "task {} exceeded {:?}",
                    task.id, self.timeout_duration
                ));
                warn!("{}", err);
                TaskResult::failure(task, worker_id, err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::handler::TaskHandler;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Slow;

    #[async_trait]
    impl TaskHandler for Slow {
        async fn handle(&self, _data: &Value) -> crate::Result<Value> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!({}))
        }
    }

    fn panicking(_data: &Value) -> crate::Result<Value> {
        panic!("model exploded")
    }

    fn failing(_data: &Value) -> crate::Result<Value> {
        Err(DispatchError::HandlerFailure("bad input".to_string()))
    }

    fn executor() -> TaskExecutor {
        let registry = HandlerRegistry::with_defaults()
            .with("slow", Slow)
            .with("panic", panicking)
            .with("fail", failing);
        TaskExecutor::new(registry, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_unknown_type_yields_error_result() {
        let task = Task::with_id("t", "foo", json!({}));
        let result = executor().execute(&task, 0).await;
        assert!(result.error.unwrap().contains("Unknown task type: foo"));
    }

    #[tokio::test]
    async fn test_handler_error_and_panic_are_contained() {
        let exec = executor();

        let result = exec.execute(&Task::with_id("a", "fail", json!({})), 1).await;
        assert_eq!(result.error.as_deref(), Some("Handler failure: bad input"));

        let result = exec.execute(&Task::with_id("b", "panic", json!({})), 1).await;
        assert!(result.error.unwrap().contains("panicked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_times_out() {
        let result = executor()
            .execute(&Task::with_id("c", "slow", json!({})), 2)
            .await;
        assert!(result.error.unwrap().starts_with("Handler timed out"));
        assert_eq!(result.worker_id, 2);
    }
}
