// src/engine/mod.rs
//! Simulation engine
//!
//! - **Planner**: proposes the events of a tick from current world state
//! - **Cadence**: adaptive simulated tick duration
//! - **Tasks**: the generation task type and its handler
//! - **Tick Engine**: plan, schedule, await, integrate, commit
//! - **Universe**: runs ticks to completion with checkpoints
//! - **Progress**: non-blocking status snapshots for pollers

pub mod cadence;
pub mod planner;
pub mod progress;
pub mod tasks;
pub mod tick_engine;
pub mod universe;

pub use cadence::TickCadence;
pub use planner::{
    EventPlanner, HeuristicPlanner, PlannedEvent, PlannedMessage, PlannedTension, PlanningInput,
};
pub use progress::{Phase, ProgressHandle, ProgressReporter, ProgressSnapshot};
pub use tasks::{register_compose_handler, ComposePayload, COMPOSE_ARTIFACT};
pub use tick_engine::{TickEngine, TickOptions, TickResult};
pub use universe::{RunOutcome, Universe};
