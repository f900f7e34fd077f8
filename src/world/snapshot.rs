// src/world/snapshot.rs
//! Owned, read-only view of a world for status queries

use crate::world::ids::{TensionId, WorldId};
use crate::world::state::UniverseStatus;
use crate::world::tension::{TensionKind, TensionStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TensionSummary {
    pub id: TensionId,
    pub kind: TensionKind,
    pub status: TensionStatus,
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldSnapshot {
    pub world_id: WorldId,
    pub name: String,
    pub tick: u64,
    pub sim_start: DateTime<Utc>,
    pub sim_time: DateTime<Utc>,
    pub status: UniverseStatus,
    pub characters: usize,
    pub relationships: usize,
    pub knowledge_items: usize,
    pub events: usize,
    pub artifacts: usize,
    pub tensions: Vec<TensionSummary>,
    pub last_event: Option<String>,
}

impl WorldSnapshot {
    /// Tensions that have not resolved yet
    pub fn open_tensions(&self) -> usize {
        self.tensions
            .iter()
            .filter(|t| !t.status.is_terminal())
            .count()
    }

    /// Hottest open tension, if any
    pub fn max_intensity(&self) -> f64 {
        self.tensions
            .iter()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.intensity)
            .fold(0.0, f64::max)
    }
}
