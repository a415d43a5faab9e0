/// Stock sentiment and routing handlers
pub mod builtin;
/// Task execution against the handler registry
pub mod executor;
/// Handler trait and registry
pub mod handler;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Type tag carried by every task, used to pick a handler
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskType {
    /// Score the sentiment of a customer message
    SentimentAnalysis,
    /// Decide where a customer request should go
    Routing,
    /// Any other tag; dispatched only if a handler was registered for it
    Other(String),
}

impl TaskType {
    /// Wire name of the tag
    pub fn as_str(&self) -> &str {
        match self {
            TaskType::SentimentAnalysis => "sentiment_analysis",
            TaskType::Routing => "routing",
            TaskType::Other(tag) => tag,
        }
    }
}

impl From<String> for TaskType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "sentiment_analysis" => TaskType::SentimentAnalysis,
            "routing" => TaskType::Routing,
            _ => TaskType::Other(tag),
        }
    }
}

impl From<&str> for TaskType {
    fn from(tag: &str) -> Self {
        TaskType::from(tag.to_string())
    }
}

impl From<TaskType> for String {
    fn from(task_type: TaskType) -> Self {
        match task_type {
            TaskType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work submitted for processing.
///
/// Tasks are never mutated once enqueued; a worker turns each one into
/// exactly one [`TaskResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    #[serde(default)]
    pub id: String,

    /// Handler selector
    #[serde(rename = "type")]
    pub task_type: TaskType,

    /// Type-specific payload
    #[serde(default = "empty_object")]
    pub data: Value,
}

impl Task {
    /// Create a task with a fresh UUID
    pub fn new(task_type: impl Into<TaskType>, data: Value) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), task_type, data)
    }

    /// Create a task with a caller-assigned id
    pub fn with_id(id: impl Into<String>, task_type: impl Into<TaskType>, data: Value) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            data,
        }
    }
}

/// Outcome envelope produced by a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Id of the originating task
    pub task_id: String,

    /// Echo of the originating task type
    #[serde(rename = "type")]
    pub task_type: TaskType,

    /// Identity of the worker that produced this result
    pub worker_id: usize,

    /// Handler output; an empty object when processing failed
    #[serde(default = "empty_object")]
    pub result: Value,

    /// Failure description, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    /// Successful outcome for `task`
    pub fn success(task: &Task, worker_id: usize, result: Value) -> Self {
        Self {
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            worker_id,
            result,
            error: None,
        }
    }

    /// Failed outcome for `task`
    pub fn failure(task: &Task, worker_id: usize, error: impl fmt::Display) -> Self {
        Self {
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            worker_id,
            result: empty_object(),
            error: Some(error.to_string()),
        }
    }

    /// Check if the task failed
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}
