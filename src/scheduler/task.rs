// src/scheduler/task.rs
//! Task descriptors, lifecycle states and outcomes
//!
//! ```text
//!            deps complete          dispatched
//! Blocked ───────────────▶ Pending ───────────▶ Running ──▶ Complete
//!    │                       ▲  │                  │
//!    │ dep failed / cancel   │  │ cancel           │ retryable failure
//!    ▼                       │  ▼                  │ (attempts left)
//!  Failed ◀──────────────────┼──┴──────────────────┤
//!                            └─────────────────────┘
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use ulid::Ulid;

/// Opaque task payload
pub type TaskPayload = serde_json::Value;

/// Value a handler produces on success
pub type TaskOutput = serde_json::Value;

/// What every waiter eventually receives
pub type TaskOutcome = std::result::Result<TaskOutput, TaskError>;

/// Unique task ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new() -> Self {
        Self(format!("task_{}", Ulid::new()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting on at least one dependency
    Blocked,

    /// Eligible for dispatch
    Pending,

    /// Handler in flight
    Running,

    /// Terminal success
    Complete,

    /// Terminal failure
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }
}

/// Options supplied at enqueue time
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    /// Tasks that must reach `Complete` first
    pub dependencies: Vec<TaskId>,

    /// Task priority (higher = more urgent)
    pub priority: u32,

    /// Total attempts allowed; scheduler default when unset
    pub max_retries: Option<u32>,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn depends_on(mut self, dependency: TaskId) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }
}

/// Everything a handler gets to see
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub task_type: String,
    pub payload: TaskPayload,

    /// 1-based attempt number
    pub attempt: u32,

    /// Outputs of the completed dependencies, keyed by dependency id
    pub dependency_outputs: HashMap<TaskId, TaskOutput>,
}

impl TaskContext {
    /// Decode the payload; a malformed payload is never worth retrying
    pub fn payload_as<T: DeserializeOwned>(&self) -> std::result::Result<T, TaskFailure> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| TaskFailure::Fatal(format!("malformed payload: {}", e)))
    }

    /// Decode one dependency's output
    pub fn dependency_output<T: DeserializeOwned>(
        &self,
        dependency: &TaskId,
    ) -> std::result::Result<T, TaskFailure> {
        let value = self.dependency_outputs.get(dependency).ok_or_else(|| {
            TaskFailure::Fatal(format!("missing output of dependency {}", dependency))
        })?;
        serde_json::from_value(value.clone())
            .map_err(|e| TaskFailure::Fatal(format!("malformed dependency output: {}", e)))
    }
}

/// How a handler reports failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    /// Worth another attempt (timeouts, rate limits)
    Retryable(String),

    /// Fails the task immediately regardless of remaining attempts
    Fatal(String),
}

impl TaskFailure {
    pub fn message(&self) -> &str {
        match self {
            TaskFailure::Retryable(msg) | TaskFailure::Fatal(msg) => msg,
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Retryable(msg) => write!(f, "retryable: {}", msg),
            TaskFailure::Fatal(msg) => write!(f, "fatal: {}", msg),
        }
    }
}

/// Terminal error delivered to waiters
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("dependency failed: {dependency}")]
    DependencyFailed { dependency: TaskId },

    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("cancelled")]
    Cancelled,

    #[error("unknown task: {0}")]
    Unknown(TaskId),
}

impl TaskError {
    /// Short reason string recorded on failed tasks
    pub fn reason(&self) -> &'static str {
        match self {
            TaskError::DependencyFailed { .. } => "dependency failed",
            TaskError::RetriesExhausted { .. } => "retries exhausted",
            TaskError::Fatal(_) => "fatal",
            TaskError::Cancelled => "cancelled",
            TaskError::Unknown(_) => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_are_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("task_"));
    }

    #[test]
    fn test_options_builder() {
        let dep = TaskId::new();
        let options = TaskOptions::new()
            .with_priority(7)
            .with_max_retries(2)
            .depends_on(dep.clone());

        assert_eq!(options.priority, 7);
        assert_eq!(options.max_retries, Some(2));
        assert_eq!(options.dependencies, vec![dep]);
    }

    #[test]
    fn test_malformed_payload_is_fatal() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Expected {
            name: String,
        }

        let ctx = TaskContext {
            task_id: TaskId::new(),
            task_type: "t".into(),
            payload: serde_json::json!({"wrong": 1}),
            attempt: 1,
            dependency_outputs: HashMap::new(),
        };

        let err = ctx.payload_as::<Expected>().unwrap_err();
        assert!(matches!(err, TaskFailure::Fatal(_)));
    }

    #[test]
    fn test_error_reasons() {
        assert_eq!(TaskError::Cancelled.reason(), "cancelled");
        assert_eq!(
            TaskError::DependencyFailed { dependency: TaskId::new() }.reason(),
            "dependency failed"
        );
    }
}
