// src/world/knowledge.rs
//! Facts known inside a world

use crate::world::ids::{ArtifactId, EventId, KnowledgeId};
use serde::{Deserialize, Serialize};

/// Where a fact came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    /// Extracted from a source document at seed time
    Seed { document: String },

    /// Minted by an event (revelations, uncovered secrets)
    Event { event_id: EventId },

    /// Stated in a generated message
    Artifact { artifact_id: ArtifactId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: KnowledgeId,
    pub fact: String,
    pub provenance: Provenance,

    /// [0, 1]
    pub confidence: f64,

    pub created_tick: u64,
}

impl KnowledgeItem {
    pub fn new(
        id: KnowledgeId,
        fact: impl Into<String>,
        provenance: Provenance,
        confidence: f64,
        created_tick: u64,
    ) -> Self {
        Self {
            id,
            fact: fact.into(),
            provenance,
            confidence: confidence.clamp(0.0, 1.0),
            created_tick,
        }
    }

    pub fn from_seed(id: KnowledgeId, fact: impl Into<String>, document: impl Into<String>) -> Self {
        Self::new(
            id,
            fact,
            Provenance::Seed {
                document: document.into(),
            },
            1.0,
            0,
        )
    }
}
