// src/world/relationship.rs
//! Relationships between pairs of characters

use crate::utils::errors::{EngineError, Result};
use crate::world::ids::{CharacterId, RelationshipId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Colleague,
    Friend,
    Rival,
    Family,
    Romantic,
    Mentor,
    Adversary,
    Acquaintance,
}

/// Unordered pair; endpoints are stored sorted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub a: CharacterId,
    pub b: CharacterId,
    pub kind: RelationshipKind,

    /// [0, 1]
    pub strength: f64,

    /// [-1, 1]
    pub sentiment: f64,
}

impl Relationship {
    pub fn new(
        a: CharacterId,
        b: CharacterId,
        kind: RelationshipKind,
        strength: f64,
        sentiment: f64,
    ) -> Result<Self> {
        if a == b {
            return Err(EngineError::InvariantViolation(format!(
                "relationship endpoints must differ ({})",
                a
            )));
        }

        let id = RelationshipId::between(&a, &b);
        let (a, b) = if a <= b { (a, b) } else { (b, a) };

        Ok(Self {
            id,
            a,
            b,
            kind,
            strength: strength.clamp(0.0, 1.0),
            sentiment: sentiment.clamp(-1.0, 1.0),
        })
    }

    pub fn involves(&self, character: &CharacterId) -> bool {
        &self.a == character || &self.b == character
    }

    pub fn other(&self, character: &CharacterId) -> Option<&CharacterId> {
        if &self.a == character {
            Some(&self.b)
        } else if &self.b == character {
            Some(&self.a)
        } else {
            None
        }
    }

    pub fn reinforce(&mut self, strength_delta: f64, sentiment_delta: f64) {
        self.strength = (self.strength + strength_delta).clamp(0.0, 1.0);
        self.sentiment = (self.sentiment + sentiment_delta).clamp(-1.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_normalized_and_clamped() {
        let rel = Relationship::new(
            CharacterId::from("zed"),
            CharacterId::from("amy"),
            RelationshipKind::Rival,
            1.7,
            -3.0,
        )
        .unwrap();

        assert_eq!(rel.a.as_str(), "amy");
        assert_eq!(rel.b.as_str(), "zed");
        assert_eq!(rel.strength, 1.0);
        assert_eq!(rel.sentiment, -1.0);
        assert_eq!(rel.other(&CharacterId::from("amy")), Some(&CharacterId::from("zed")));
    }

    #[test]
    fn test_self_relationship_rejected() {
        let same = CharacterId::from("amy");
        assert!(Relationship::new(same.clone(), same, RelationshipKind::Friend, 0.5, 0.0).is_err());
    }

    #[test]
    fn test_reinforce_clamps() {
        let mut rel = Relationship::new(
            CharacterId::from("a"),
            CharacterId::from("b"),
            RelationshipKind::Friend,
            0.99,
            0.98,
        )
        .unwrap();
        rel.reinforce(0.05, 0.05);
        assert_eq!(rel.strength, 1.0);
        assert_eq!(rel.sentiment, 1.0);
    }
}
