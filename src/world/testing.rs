// src/world/testing.rs
//! Shared fixtures for unit tests

use crate::world::character::Persona;
use crate::world::ids::{CharacterId, KnowledgeId, TensionId, WorldId};
use crate::world::relationship::RelationshipKind;
use crate::world::seed::{CharacterSeed, KnowledgeSeed, RelationshipSeed, TensionSeed, WorldSeed};
use crate::world::state::WorldState;
use crate::world::tension::{TensionKind, TensionStatus};

fn character(id: &str, name: &str, persona: bool) -> CharacterSeed {
    CharacterSeed {
        id: CharacterId::from(id),
        name: name.to_string(),
        email: None,
        role: "analyst".to_string(),
        persona: persona.then(|| Persona {
            name: name.to_string(),
            voice: "direct".to_string(),
            provider: None,
        }),
        goals: vec![format!("{} gets promoted", name)],
        emotional_baseline: 0.1,
    }
}

/// Three characters with personas, one without; two tensions; two facts
pub(crate) fn office_seed() -> WorldSeed {
    WorldSeed {
        name: "Northwind Office".to_string(),
        start_time: chrono::DateTime::<chrono::Utc>::from_timestamp(1_704_096_000, 0)
            .unwrap_or_default(),
        planner_seed: 7,
        characters: vec![
            character("alice", "Alice", true),
            character("bob", "Bob", true),
            character("carol", "Carol", true),
            character("dave", "Dave", false),
        ],
        relationships: vec![RelationshipSeed {
            a: CharacterId::from("alice"),
            b: CharacterId::from("bob"),
            kind: RelationshipKind::Colleague,
            strength: 0.5,
            sentiment: 0.2,
        }],
        tensions: vec![
            TensionSeed {
                id: TensionId::from("t_budget"),
                kind: TensionKind::Conflict,
                description: "Budget overrun".to_string(),
                participants: vec![CharacterId::from("alice"), CharacterId::from("bob")],
                intensity: 0.5,
                status: TensionStatus::Active,
            },
            TensionSeed {
                id: TensionId::from("t_secret"),
                kind: TensionKind::Secret,
                description: "Carol is interviewing elsewhere".to_string(),
                participants: vec![CharacterId::from("carol")],
                intensity: 0.2,
                status: TensionStatus::Building,
            },
        ],
        knowledge: vec![
            KnowledgeSeed {
                id: KnowledgeId::from("k_overrun"),
                fact: "Freight costs are 18% over plan".to_string(),
                document: "q3-report.txt".to_string(),
                confidence: 0.9,
                holders: vec![CharacterId::from("alice")],
            },
            KnowledgeSeed {
                id: KnowledgeId::from("k_offer"),
                fact: "Carol has an offer from a competitor".to_string(),
                document: "seed".to_string(),
                confidence: 1.0,
                holders: vec![CharacterId::from("carol")],
            },
        ],
    }
}

pub(crate) fn office_world() -> WorldState {
    WorldState::from_seed(WorldId::from("world_test"), office_seed())
        .unwrap_or_else(|e| panic!("fixture seed is invalid: {}", e))
}
