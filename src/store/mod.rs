// src/store/mod.rs
//! Durable world checkpoints
//!
//! The universe saves once per tick, after integration. A restarted process
//! loads the last checkpoint and continues from its tick.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryWorldStore;
pub use sqlite::SqliteWorldStore;

use crate::utils::errors::Result;
use crate::world::ids::WorldId;
use crate::world::state::WorldState;
use async_trait::async_trait;
use serde::Serialize;

/// One row of `list_worlds`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldSummary {
    pub id: WorldId,
    pub name: String,
    pub tick: u64,
    pub status: String,
}

#[async_trait]
pub trait WorldStore: Send + Sync {
    /// Last checkpoint for `id`, or `None` if it was never saved
    async fn load_world(&self, id: &WorldId) -> Result<Option<WorldState>>;

    /// Persist the world; re-saving the same state is idempotent
    async fn save_world(&self, world: &WorldState) -> Result<()>;

    async fn list_worlds(&self) -> Result<Vec<WorldSummary>>;
}

pub(crate) fn summarize(world: &WorldState) -> WorldSummary {
    WorldSummary {
        id: world.id().clone(),
        name: world.name().to_string(),
        tick: world.tick(),
        status: world.status().as_str().to_string(),
    }
}
