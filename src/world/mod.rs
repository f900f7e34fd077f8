// src/world/mod.rs
//! World state model
//!
//! - **Ids**: stable, deterministic entity identifiers
//! - **Character / Relationship / Knowledge**: the cast and what they know
//! - **Tension**: forward-only narrative state machine
//! - **Event / Artifact**: the event log and the messages generated for it
//! - **State**: the single-writer aggregate and its invariants
//! - **Seed**: tick-0 input from the document pipeline
//! - **Snapshot**: owned read-only view for status queries

pub mod character;
pub mod event;
pub mod ids;
pub mod knowledge;
pub mod relationship;
pub mod seed;
pub mod snapshot;
pub mod state;
pub mod tension;

#[cfg(test)]
pub(crate) mod testing;

pub use character::{Character, Goal, Persona};
pub use event::{Artifact, EventKind, TensionImpact, WorldEvent};
pub use ids::{ArtifactId, CharacterId, EventId, KnowledgeId, RelationshipId, TensionId, WorldId};
pub use knowledge::{KnowledgeItem, Provenance};
pub use relationship::{Relationship, RelationshipKind};
pub use seed::{SeedFile, SeedProvider, WorldSeed};
pub use snapshot::{TensionSummary, WorldSnapshot};
pub use state::{SimClock, UniverseStatus, WorldEntities, WorldMetadata, WorldState};
pub use tension::{Tension, TensionEffect, TensionKind, TensionRules, TensionStatus};
