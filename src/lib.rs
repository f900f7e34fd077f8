// src/lib.rs
//! Worldsim Engine Library
//!
//! Tick-based world simulator: characters with bound personas exchange
//! email over simulated time while tensions between them build and resolve.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **scheduler**: dependency-aware, retrying, bounded-concurrency task queue
//! - **gateway**: persona-bound text generation with provider fallback
//! - **world**: the world state aggregate and its seed
//! - **engine**: planner, tick engine, universe runner and progress
//! - **store**: world checkpoints (SQLite, in-memory)
//! - **export**: JSON and mbox rendering of generated mail
//! - **observability**: tracing and metrics setup
//! - **utils**: configuration and errors

// Public module exports
pub mod engine;
pub mod export;
pub mod gateway;
pub mod observability;
pub mod scheduler;
pub mod store;
pub mod utils;
pub mod world;

// Re-export commonly used types
pub use engine::{TickEngine, TickOptions, TickResult, Universe};
pub use scheduler::TaskScheduler;
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};
pub use world::WorldState;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
