//! Handler trait and registry

use crate::task::TaskType;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// A capability that turns a task payload into a result payload.
///
/// Workers know nothing about a handler beyond this signature; failures are
/// reported through the returned `Result` (or, worst case, a panic) and are
/// turned into error results by the executor.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Process one payload
    async fn handle(&self, data: &Value) -> crate::Result<Value>;
}

#[async_trait]
impl<F> TaskHandler for F
where
    F: Fn(&Value) -> crate::Result<Value> + Send + Sync,
{
    async fn handle(&self, data: &Value) -> crate::Result<Value> {
        self(data)
    }
}

/// Mapping from task type tag to handler
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the stock sentiment and routing handlers
    pub fn with_defaults() -> Self {
        Self::new()
            .with(TaskType::SentimentAnalysis, super::builtin::SentimentHandler::new())
            .with(TaskType::Routing, super::builtin::RoutingHandler::new())
    }

    /// Register a handler, replacing any previous one for the same tag
    pub fn register<H>(&mut self, task_type: impl Into<TaskType>, handler: H)
    where
        H: TaskHandler + 'static,
    {
        let task_type = task_type.into();
        info!("Registered handler for task type: {}", task_type);
        self.handlers.insert(task_type, Arc::new(handler));
    }

    /// Chainable [`register`](Self::register)
    pub fn with<H>(mut self, task_type: impl Into<TaskType>, handler: H) -> Self
    where
        H: TaskHandler + 'static,
    {
        self.register(task_type, handler);
        self
    }

    /// Handler for a tag, if one is registered
    pub fn get(&self, task_type: &TaskType) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).cloned()
    }

    /// Check if a handler is registered for a tag
    pub fn contains(&self, task_type: &TaskType) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Registered tags
    pub fn task_types(&self) -> Vec<TaskType> {
        self.handlers.keys().cloned().collect()
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if no handler is registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
