// src/world/character.rs
//! Characters and their persona bindings

use crate::world::ids::{CharacterId, KnowledgeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The voice a character writes in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Display name used when signing messages
    pub name: String,

    /// Free-form description of tone and style
    #[serde(default)]
    pub voice: String,

    /// Preferred generation provider; gateway default when unset
    #[serde(default)]
    pub provider: Option<String>,
}

/// Something a character is working towards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub description: String,

    /// 0.0 = untouched, 1.0 = achieved
    #[serde(default)]
    pub progress: f64,
}

impl Goal {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            progress: 0.0,
        }
    }

    pub fn is_achieved(&self) -> bool {
        self.progress >= 1.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub email: String,
    pub role: String,

    /// Characters without a persona cannot author artifacts
    pub persona: Option<Persona>,

    /// Facts this character holds
    pub knowledge: BTreeSet<KnowledgeId>,

    pub goals: Vec<Goal>,

    /// Resting mood in [-1, 1]
    pub emotional_baseline: f64,
}

impl Character {
    pub fn new(id: impl Into<CharacterId>, name: impl Into<String>) -> Self {
        let id = id.into();
        let email = format!("{}@worldsim.local", id.as_str().to_lowercase().replace(' ', "."));
        Self {
            id,
            name: name.into(),
            email,
            role: String::new(),
            persona: None,
            knowledge: BTreeSet::new(),
            goals: Vec::new(),
            emotional_baseline: 0.0,
        }
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = Some(persona);
        self
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goals.push(Goal::new(goal));
        self
    }

    pub fn has_persona(&self) -> bool {
        self.persona.is_some()
    }

    pub fn knows(&self, fact: &KnowledgeId) -> bool {
        self.knowledge.contains(fact)
    }

    /// Returns true when the fact is new to this character
    pub fn learn(&mut self, fact: KnowledgeId) -> bool {
        self.knowledge.insert(fact)
    }

    /// Push the first unfinished goal forward
    pub fn advance_goals(&mut self, amount: f64) {
        if let Some(goal) = self.goals.iter_mut().find(|g| !g.is_achieved()) {
            goal.progress = (goal.progress + amount.max(0.0)).min(1.0);
        }
    }

    pub fn current_goal(&self) -> Option<&Goal> {
        self.goals.iter().find(|g| !g.is_achieved())
    }
}
