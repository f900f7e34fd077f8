// src/world/ids.rs
//! Stable entity identifiers
//!
//! Ids minted during a tick are pure functions of (tick, position) so a
//! re-save upserts the same rows and a resumed run reproduces the ids an
//! uninterrupted run would have produced.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// One simulated universe
    WorldId
);
string_id!(CharacterId);
string_id!(RelationshipId);
string_id!(TensionId);
string_id!(KnowledgeId);
string_id!(EventId);
string_id!(ArtifactId);

impl WorldId {
    pub fn generate() -> Self {
        Self(format!("world_{}", Ulid::new()))
    }
}

impl RelationshipId {
    /// Same id regardless of argument order
    pub fn between(a: &CharacterId, b: &CharacterId) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("rel_{}__{}", first, second))
    }
}

impl TensionId {
    pub fn spawned(tick: u64, index: usize) -> Self {
        Self(format!("ten_{:06}_{:02}", tick, index))
    }
}

impl KnowledgeId {
    pub fn minted(tick: u64, index: usize) -> Self {
        Self(format!("kn_{:06}_{:02}", tick, index))
    }
}

impl EventId {
    pub fn for_tick(tick: u64, index: usize) -> Self {
        Self(format!("evt_{:06}_{:02}", tick, index))
    }
}

impl ArtifactId {
    pub fn for_message(event: &EventId, message: usize) -> Self {
        let suffix = event.as_str().trim_start_matches("evt_");
        Self(format!("art_{}_{:02}", suffix, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_id_is_order_independent() {
        let a = CharacterId::from("alice");
        let b = CharacterId::from("bob");
        assert_eq!(RelationshipId::between(&a, &b), RelationshipId::between(&b, &a));
        assert_eq!(RelationshipId::between(&a, &b).as_str(), "rel_alice__bob");
    }

    #[test]
    fn test_deterministic_ids() {
        let event = EventId::for_tick(6, 2);
        assert_eq!(event.as_str(), "evt_000006_02");
        assert_eq!(ArtifactId::for_message(&event, 1).as_str(), "art_000006_02_01");
        assert_eq!(TensionId::spawned(3, 0).as_str(), "ten_000003_00");
        assert_eq!(KnowledgeId::minted(3, 4).as_str(), "kn_000003_04");
    }

    #[test]
    fn test_world_ids_are_unique() {
        assert_ne!(WorldId::generate(), WorldId::generate());
    }

    #[test]
    fn test_transparent_serde() {
        let id = CharacterId::from("carol");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"carol\"");
    }
}
