// src/scheduler/mod.rs
//! Generic task scheduling
//!
//! - **Task**: ids, lifecycle states, options, handler context and outcomes
//! - **Graph**: explicit dependency graph with lazy unblocking
//! - **Task Scheduler**: bounded worker pool with priorities and retries
//! - **Stats**: live counters and running latency average
//!
//! # Architecture
//!
//! ```text
//!   enqueue(type, payload, deps, priority, max_retries)
//!                    │
//!          ┌─────────▼──────────┐
//!          │  Dependency Graph  │  blocked ──▶ pending
//!          └─────────┬──────────┘
//!                    │ highest priority first
//!          ┌─────────▼──────────┐
//!          │  Worker pool (N)   │  tokio tasks, retry on failure
//!          └─────────┬──────────┘
//!                    ▼
//!          watch channel per task ──▶ await_result (any number of waiters)
//! ```

pub mod graph;
pub mod stats;
pub mod task;
pub mod task_scheduler;

// Re-export commonly used types
pub use graph::DependencyGraph;
pub use stats::SchedulerStats;
pub use task::{
    TaskContext, TaskError, TaskFailure, TaskId, TaskOptions, TaskOutcome, TaskOutput,
    TaskPayload, TaskStatus,
};
pub use task_scheduler::{TaskHandler, TaskScheduler};
