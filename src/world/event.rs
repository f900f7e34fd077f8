// src/world/event.rs
//! Events and the artifacts generated for them

use crate::world::ids::{ArtifactId, CharacterId, EventId, KnowledgeId, TensionId};
use crate::world::tension::TensionEffect;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Routine,
    Meeting,
    Deadline,
    Conflict,
    Discovery,
    Revelation,
    Betrayal,
    Alliance,
    Opportunity,
    Crisis,
}

impl EventKind {
    /// Sentiment nudge applied to relationships between participants
    pub fn tone(&self) -> f64 {
        match self {
            EventKind::Routine | EventKind::Meeting | EventKind::Discovery => 0.0,
            EventKind::Alliance => 0.05,
            EventKind::Opportunity => 0.03,
            EventKind::Deadline => -0.01,
            EventKind::Conflict => -0.05,
            EventKind::Crisis => -0.03,
            EventKind::Revelation => -0.02,
            EventKind::Betrayal => -0.1,
        }
    }

    /// Events of this kind mint a new fact for their participants
    pub fn reveals_knowledge(&self) -> bool {
        matches!(self, EventKind::Revelation | EventKind::Discovery)
    }

    /// Only these may pull a resolving tension back to active
    pub fn permits_reescalation(&self) -> bool {
        matches!(self, EventKind::Revelation | EventKind::Betrayal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Routine => "routine",
            EventKind::Meeting => "meeting",
            EventKind::Deadline => "deadline",
            EventKind::Conflict => "conflict",
            EventKind::Discovery => "discovery",
            EventKind::Revelation => "revelation",
            EventKind::Betrayal => "betrayal",
            EventKind::Alliance => "alliance",
            EventKind::Opportunity => "opportunity",
            EventKind::Crisis => "crisis",
        }
    }
}

/// Declared effect of an event on one tension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensionImpact {
    pub tension_id: TensionId,
    pub effect: TensionEffect,
}

/// Entry in the world's event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEvent {
    pub id: EventId,
    pub tick: u64,
    pub kind: EventKind,
    pub description: String,
    pub participants: Vec<CharacterId>,

    /// Tension effects that were actually applied
    pub impacts: Vec<TensionImpact>,

    /// Tensions this event opened
    #[serde(default)]
    pub spawned_tensions: Vec<TensionId>,

    /// Fact minted by this event, if any
    #[serde(default)]
    pub revealed: Option<KnowledgeId>,

    /// Simulated time the event happened at
    pub sim_time: DateTime<Utc>,
}

impl WorldEvent {
    pub fn affects(&self, tension: &TensionId) -> bool {
        self.impacts.iter().any(|i| &i.tension_id == tension)
    }

    /// One-line summary for progress reporting
    pub fn summary(&self) -> String {
        format!("[tick {}] {}: {}", self.tick, self.kind.as_str(), self.description)
    }
}

/// A generated message attributed to one character and one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub event_id: EventId,
    pub tick: u64,
    pub author: CharacterId,
    pub recipients: Vec<CharacterId>,
    pub subject: String,
    pub body: String,

    /// Parent message this one replies to
    #[serde(default)]
    pub in_reply_to: Option<ArtifactId>,

    /// Facts the author drew on; all held by the author at creation
    #[serde(default)]
    pub knowledge_refs: Vec<KnowledgeId>,

    pub sent_at: DateTime<Utc>,
}

impl Artifact {
    pub fn is_reply(&self) -> bool {
        self.in_reply_to.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reescalation_kinds() {
        assert!(EventKind::Revelation.permits_reescalation());
        assert!(EventKind::Betrayal.permits_reescalation());
        assert!(!EventKind::Conflict.permits_reescalation());
        assert!(!EventKind::Routine.permits_reescalation());
    }

    #[test]
    fn test_summary() {
        let event = WorldEvent {
            id: EventId::for_tick(2, 0),
            tick: 2,
            kind: EventKind::Meeting,
            description: "quarterly review".into(),
            participants: vec![],
            impacts: vec![TensionImpact {
                tension_id: TensionId::from("t"),
                effect: TensionEffect::Intensify { delta: 0.1 },
            }],
            spawned_tensions: vec![],
            revealed: None,
            sim_time: Utc::now(),
        };
        assert_eq!(event.summary(), "[tick 2] meeting: quarterly review");
        assert!(event.affects(&TensionId::from("t")));
    }
}
