// src/utils/errors.rs
//! Error types for the simulation engine
//!
//! `EngineError` covers everything that crosses a component boundary.
//! Task handler failures and gateway failures have their own types
//! (`TaskFailure`, `TaskError`, `GatewayError`) because the scheduler and
//! the tick engine absorb them instead of propagating them.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// `enqueue` was called for a task type with no registered handler
    #[error("no handler registered for task type '{0}'")]
    UnregisteredTaskType(String),

    /// A second handler was registered for the same task type
    #[error("handler already registered for task type '{0}'")]
    HandlerAlreadyRegistered(String),

    /// A task id that the scheduler does not know about
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// Scheduler rejected the request (bad options, shut down)
    #[error("scheduler error: {0}")]
    SchedulerError(String),

    /// A tension was asked to move backwards through its lifecycle
    #[error("invalid tension transition for {tension}: {from} -> {to}")]
    InvalidTensionTransition {
        tension: String,
        from: String,
        to: String,
    },

    /// A world-state invariant would be broken by the requested mutation
    #[error("world invariant violated: {0}")]
    InvariantViolation(String),

    /// Referenced entity does not exist in the world
    #[error("not found: {0}")]
    NotFound(String),

    /// Event planning failed
    #[error("planning failed: {0}")]
    PlanningFailed(String),

    /// A tick could not be completed (planning and fallback both failed)
    #[error("tick {tick} failed: {reason}")]
    TickFailed { tick: u64, reason: String },

    /// Persona binding problems surfaced outside of a task
    #[error("binding error: {0}")]
    BindingError(String),

    /// Seed document could not be loaded or validated
    #[error("seed error: {0}")]
    SeedError(String),

    /// Persistent store failure
    #[error("storage failed: {0}")]
    StorageFailed(String),

    /// Serialization failure
    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    /// Export failure
    #[error("export failed: {0}")]
    ExportFailed(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The universe exceeded its wall-clock ceiling
    #[error("wall-clock ceiling of {0:?} exceeded")]
    WallClockExceeded(std::time::Duration),

    /// The universe reached a terminal failed state
    #[error("universe failed: {0}")]
    UniverseFailed(String),
}

impl EngineError {
    /// Universe-level faults end the simulation instead of being retried
    pub fn is_universe_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::StorageFailed(_)
                | EngineError::WallClockExceeded(_)
                | EngineError::UniverseFailed(_)
        )
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::SerializationFailed(e.to_string())
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::StorageFailed(e.to_string())
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(e: config::ConfigError) -> Self {
        EngineError::ConfigError(e.to_string())
    }
}
