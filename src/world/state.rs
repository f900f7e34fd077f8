// src/world/state.rs
//! World state aggregate
//!
//! The single mutable source of truth for one universe. Only the tick engine
//! writes to it, one tick at a time; everything else reads a `WorldSnapshot`.
//!
//! Mutations validate before they touch anything, so a rejected call leaves
//! the world exactly as it was.

use crate::utils::errors::{EngineError, Result};
use crate::world::character::Character;
use crate::world::event::{Artifact, EventKind, TensionImpact, WorldEvent};
use crate::world::ids::{
    ArtifactId, CharacterId, EventId, KnowledgeId, RelationshipId, TensionId, WorldId,
};
use crate::world::knowledge::KnowledgeItem;
use crate::world::relationship::{Relationship, RelationshipKind};
use crate::world::seed::WorldSeed;
use crate::world::snapshot::{TensionSummary, WorldSnapshot};
use crate::world::tension::{Tension, TensionRules};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace};

/// Relationship strength gained per exchanged artifact
const ARTIFACT_STRENGTH_GAIN: f64 = 0.02;

/// Goal progress an author makes per artifact
const ARTIFACT_GOAL_PROGRESS: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimClock {
    pub start: DateTime<Utc>,
    pub current: DateTime<Utc>,
}

impl SimClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start,
            current: start,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.current - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UniverseStatus {
    Active,
    Complete,
    Failed { reason: String },
}

impl UniverseStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UniverseStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UniverseStatus::Active => "active",
            UniverseStatus::Complete => "complete",
            UniverseStatus::Failed { .. } => "failed",
        }
    }
}

/// The one-row part of a world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldMetadata {
    pub id: WorldId,
    pub name: String,
    pub planner_seed: u64,
    pub tick: u64,
    pub clock: SimClock,
    pub status: UniverseStatus,
}

/// Entity collections a store hands back when loading
#[derive(Debug, Clone, Default)]
pub struct WorldEntities {
    pub characters: Vec<Character>,
    pub relationships: Vec<Relationship>,
    pub tensions: Vec<Tension>,
    pub knowledge: Vec<KnowledgeItem>,
    pub events: Vec<WorldEvent>,
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldState {
    meta: WorldMetadata,
    characters: BTreeMap<CharacterId, Character>,
    relationships: BTreeMap<RelationshipId, Relationship>,
    tensions: BTreeMap<TensionId, Tension>,
    knowledge: BTreeMap<KnowledgeId, KnowledgeItem>,
    events: Vec<WorldEvent>,
    artifacts: Vec<Artifact>,
}

fn seed_error(message: String) -> EngineError {
    EngineError::SeedError(message)
}

impl WorldState {
    /// Build the tick-0 world from a validated seed
    pub fn from_seed(id: WorldId, seed: WorldSeed) -> Result<Self> {
        let mut characters = BTreeMap::new();
        for cs in seed.characters {
            if characters.contains_key(&cs.id) {
                return Err(seed_error(format!("duplicate character id '{}'", cs.id)));
            }

            let mut character = Character::new(cs.id.clone(), cs.name);
            if let Some(email) = cs.email {
                character.email = email;
            }
            character.role = cs.role;
            character.persona = cs.persona;
            character.emotional_baseline = cs.emotional_baseline.clamp(-1.0, 1.0);
            for goal in cs.goals {
                character = character.with_goal(goal);
            }
            characters.insert(cs.id, character);
        }

        let exists = |id: &CharacterId, what: &str| -> Result<()> {
            if characters.contains_key(id) {
                Ok(())
            } else {
                Err(seed_error(format!("{} references unknown character '{}'", what, id)))
            }
        };

        let mut relationships = BTreeMap::new();
        for rs in seed.relationships {
            exists(&rs.a, "relationship")?;
            exists(&rs.b, "relationship")?;
            let rel = Relationship::new(rs.a, rs.b, rs.kind, rs.strength, rs.sentiment)
                .map_err(|e| seed_error(e.to_string()))?;
            if relationships.contains_key(&rel.id) {
                return Err(seed_error(format!("duplicate relationship '{}'", rel.id)));
            }
            relationships.insert(rel.id.clone(), rel);
        }

        let mut tensions = BTreeMap::new();
        for ts in seed.tensions {
            if tensions.contains_key(&ts.id) {
                return Err(seed_error(format!("duplicate tension id '{}'", ts.id)));
            }
            if ts.participants.is_empty() {
                return Err(seed_error(format!("tension '{}' has no participants", ts.id)));
            }
            for p in &ts.participants {
                exists(p, "tension")?;
            }
            let tension = Tension::new(
                ts.id.clone(),
                ts.kind,
                ts.description,
                ts.participants,
                ts.intensity,
                0,
            )
            .with_status(ts.status, 0);
            tensions.insert(ts.id, tension);
        }

        let mut knowledge = BTreeMap::new();
        let mut grants = Vec::new();
        for ks in seed.knowledge {
            if knowledge.contains_key(&ks.id) {
                return Err(seed_error(format!("duplicate knowledge id '{}'", ks.id)));
            }
            for holder in &ks.holders {
                exists(holder, "knowledge")?;
                grants.push((holder.clone(), ks.id.clone()));
            }
            let mut item = KnowledgeItem::from_seed(ks.id.clone(), ks.fact, ks.document);
            item.confidence = ks.confidence.clamp(0.0, 1.0);
            knowledge.insert(ks.id, item);
        }

        for (holder, fact) in grants {
            if let Some(character) = characters.get_mut(&holder) {
                character.learn(fact);
            }
        }

        debug!(
            "World '{}' seeded: {} characters, {} relationships, {} tensions, {} facts",
            seed.name,
            characters.len(),
            relationships.len(),
            tensions.len(),
            knowledge.len()
        );

        Ok(Self {
            meta: WorldMetadata {
                id,
                name: seed.name,
                planner_seed: seed.planner_seed,
                tick: 0,
                clock: SimClock::starting_at(seed.start_time),
                status: UniverseStatus::Active,
            },
            characters,
            relationships,
            tensions,
            knowledge,
            events: Vec::new(),
            artifacts: Vec::new(),
        })
    }

    /// Reassemble a persisted world; fails if the pieces are inconsistent
    pub fn from_parts(meta: WorldMetadata, entities: WorldEntities) -> Result<Self> {
        let mut events = entities.events;
        events.sort_by(|a, b| a.tick.cmp(&b.tick).then_with(|| a.id.cmp(&b.id)));

        let state = Self {
            meta,
            characters: entities
                .characters
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
            relationships: entities
                .relationships
                .into_iter()
                .map(|r| (r.id.clone(), r))
                .collect(),
            tensions: entities
                .tensions
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect(),
            knowledge: entities
                .knowledge
                .into_iter()
                .map(|k| (k.id.clone(), k))
                .collect(),
            events,
            artifacts: entities.artifacts,
        };

        state.check_invariants()?;
        Ok(state)
    }

    /// Verify cross-entity invariants
    pub fn check_invariants(&self) -> Result<()> {
        let violation = |msg: String| Err(EngineError::InvariantViolation(msg));

        if self.meta.clock.current < self.meta.clock.start {
            return violation("simulated clock is before its start".to_string());
        }

        let mut last_tick = 0;
        for event in &self.events {
            if event.tick < last_tick || event.tick > self.meta.tick {
                return violation(format!("event {} is out of tick order", event.id));
            }
            last_tick = event.tick;
        }

        let event_ids: HashSet<&EventId> = self.events.iter().map(|e| &e.id).collect();
        for artifact in &self.artifacts {
            if !event_ids.contains(&artifact.event_id) {
                return violation(format!(
                    "artifact {} references missing event {}",
                    artifact.id, artifact.event_id
                ));
            }
            let Some(author) = self.characters.get(&artifact.author) else {
                return violation(format!(
                    "artifact {} references missing author {}",
                    artifact.id, artifact.author
                ));
            };
            if let Some(fact) = artifact.knowledge_refs.iter().find(|k| !author.knows(k)) {
                return violation(format!(
                    "artifact {} references {} unknown to {}",
                    artifact.id, fact, author.id
                ));
            }
        }

        Ok(())
    }

    // ---- reads ------------------------------------------------------------

    pub fn id(&self) -> &WorldId {
        &self.meta.id
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn planner_seed(&self) -> u64 {
        self.meta.planner_seed
    }

    pub fn tick(&self) -> u64 {
        self.meta.tick
    }

    /// Tick currently being planned and integrated
    pub fn next_tick(&self) -> u64 {
        self.meta.tick + 1
    }

    pub fn clock(&self) -> SimClock {
        self.meta.clock
    }

    pub fn status(&self) -> &UniverseStatus {
        &self.meta.status
    }

    pub fn metadata(&self) -> &WorldMetadata {
        &self.meta
    }

    pub fn character(&self, id: &CharacterId) -> Option<&Character> {
        self.characters.get(id)
    }

    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    pub fn relationship_between(&self, a: &CharacterId, b: &CharacterId) -> Option<&Relationship> {
        self.relationships.get(&RelationshipId::between(a, b))
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    pub fn tension(&self, id: &TensionId) -> Option<&Tension> {
        self.tensions.get(id)
    }

    pub fn tensions(&self) -> impl Iterator<Item = &Tension> {
        self.tensions.values()
    }

    /// Tensions that have not resolved
    pub fn open_tensions(&self) -> impl Iterator<Item = &Tension> {
        self.tensions.values().filter(|t| !t.is_resolved())
    }

    pub fn max_open_intensity(&self) -> f64 {
        self.open_tensions().map(|t| t.intensity()).fold(0.0, f64::max)
    }

    pub fn knowledge_item(&self, id: &KnowledgeId) -> Option<&KnowledgeItem> {
        self.knowledge.get(id)
    }

    pub fn knowledge(&self) -> impl Iterator<Item = &KnowledgeItem> {
        self.knowledge.values()
    }

    pub fn events(&self) -> &[WorldEvent] {
        &self.events
    }

    /// Last `n` events, oldest first
    pub fn recent_events(&self, n: usize) -> &[WorldEvent] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }

    pub fn event(&self, id: &EventId) -> Option<&WorldEvent> {
        self.events.iter().rev().find(|e| &e.id == id)
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn artifact(&self, id: &ArtifactId) -> Option<&Artifact> {
        self.artifacts.iter().rev().find(|a| &a.id == id)
    }

    pub fn artifacts_for_event(&self, id: &EventId) -> impl Iterator<Item = &Artifact> {
        let id = id.clone();
        self.artifacts.iter().filter(move |a| a.event_id == id)
    }

    /// Point-in-time copy for status readers
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            world_id: self.meta.id.clone(),
            name: self.meta.name.clone(),
            tick: self.meta.tick,
            sim_start: self.meta.clock.start,
            sim_time: self.meta.clock.current,
            status: self.meta.status.clone(),
            characters: self.characters.len(),
            relationships: self.relationships.len(),
            knowledge_items: self.knowledge.len(),
            events: self.events.len(),
            artifacts: self.artifacts.len(),
            tensions: self
                .tensions
                .values()
                .map(|t| TensionSummary {
                    id: t.id.clone(),
                    kind: t.kind,
                    status: t.status(),
                    intensity: t.intensity(),
                })
                .collect(),
            last_event: self.events.last().map(WorldEvent::summary),
        }
    }

    // ---- writes -----------------------------------------------------------

    fn ensure_active(&self) -> Result<()> {
        match &self.meta.status {
            UniverseStatus::Active => Ok(()),
            other => Err(EngineError::InvariantViolation(format!(
                "world {} is {} and can no longer change",
                self.meta.id,
                other.as_str()
            ))),
        }
    }

    fn ensure_character(&self, id: &CharacterId) -> Result<()> {
        if self.characters.contains_key(id) {
            Ok(())
        } else {
            Err(EngineError::NotFound(format!("character {}", id)))
        }
    }

    /// Append an event for the tick being integrated
    pub fn record_event(&mut self, event: WorldEvent) -> Result<()> {
        self.ensure_active()?;

        if event.tick != self.next_tick() {
            return Err(EngineError::InvariantViolation(format!(
                "event {} is for tick {} but tick {} is being integrated",
                event.id,
                event.tick,
                self.next_tick()
            )));
        }
        if self.event(&event.id).is_some() {
            return Err(EngineError::InvariantViolation(format!(
                "event {} already recorded",
                event.id
            )));
        }
        for p in &event.participants {
            self.ensure_character(p)?;
        }

        trace!("Recording event {} ({})", event.id, event.kind.as_str());
        self.events.push(event);
        Ok(())
    }

    /// Append an artifact and apply its bookkeeping
    ///
    /// The author must hold a persona and every referenced fact. Recipients
    /// learn the referenced facts, the author/recipient relationships are
    /// reinforced (or created as acquaintances) and the author's goals
    /// advance.
    pub fn record_artifact(&mut self, artifact: Artifact) -> Result<()> {
        self.ensure_active()?;

        let Some(event) = self.event(&artifact.event_id) else {
            return Err(EngineError::NotFound(format!("event {}", artifact.event_id)));
        };
        if artifact.tick != event.tick {
            return Err(EngineError::InvariantViolation(format!(
                "artifact {} tick {} differs from its event's tick {}",
                artifact.id, artifact.tick, event.tick
            )));
        }
        let tone = event.kind.tone();

        if self.artifact(&artifact.id).is_some() {
            return Err(EngineError::InvariantViolation(format!(
                "artifact {} already recorded",
                artifact.id
            )));
        }

        let author = self
            .characters
            .get(&artifact.author)
            .ok_or_else(|| EngineError::NotFound(format!("character {}", artifact.author)))?;
        if !author.has_persona() {
            return Err(EngineError::InvariantViolation(format!(
                "author {} has no persona binding",
                author.id
            )));
        }
        if let Some(fact) = artifact.knowledge_refs.iter().find(|k| !author.knows(k)) {
            return Err(EngineError::InvariantViolation(format!(
                "artifact {} references {} which {} does not know",
                artifact.id, fact, author.id
            )));
        }

        for recipient in &artifact.recipients {
            self.ensure_character(recipient)?;
        }
        if let Some(parent) = &artifact.in_reply_to {
            if self.artifact(parent).is_none() {
                return Err(EngineError::InvariantViolation(format!(
                    "artifact {} replies to missing {}",
                    artifact.id, parent
                )));
            }
        }

        // validated; now mutate
        for recipient in &artifact.recipients {
            if let Some(character) = self.characters.get_mut(recipient) {
                for fact in &artifact.knowledge_refs {
                    character.learn(fact.clone());
                }
            }
            if recipient != &artifact.author {
                self.touch_relationship(&artifact.author, recipient, tone);
            }
        }
        if let Some(author) = self.characters.get_mut(&artifact.author) {
            author.advance_goals(ARTIFACT_GOAL_PROGRESS);
        }

        trace!("Recording artifact {} by {}", artifact.id, artifact.author);
        self.artifacts.push(artifact);
        Ok(())
    }

    fn touch_relationship(&mut self, a: &CharacterId, b: &CharacterId, tone: f64) {
        let id = RelationshipId::between(a, b);
        if let Some(rel) = self.relationships.get_mut(&id) {
            rel.reinforce(ARTIFACT_STRENGTH_GAIN, tone);
            return;
        }

        match Relationship::new(
            a.clone(),
            b.clone(),
            RelationshipKind::Acquaintance,
            ARTIFACT_STRENGTH_GAIN,
            tone,
        ) {
            Ok(rel) => {
                debug!("New acquaintance: {} <-> {}", rel.a, rel.b);
                self.relationships.insert(id, rel);
            }
            Err(e) => trace!("Skipping relationship: {}", e),
        }
    }

    /// Give a character a fact; returns true when it was new to them
    pub fn share_knowledge(&mut self, character: &CharacterId, fact: &KnowledgeId) -> Result<bool> {
        self.ensure_active()?;
        if !self.knowledge.contains_key(fact) {
            return Err(EngineError::NotFound(format!("knowledge {}", fact)));
        }
        let target = self
            .characters
            .get_mut(character)
            .ok_or_else(|| EngineError::NotFound(format!("character {}", character)))?;
        Ok(target.learn(fact.clone()))
    }

    /// Add a new fact and grant it to `holders`
    pub fn mint_knowledge(&mut self, item: KnowledgeItem, holders: &[CharacterId]) -> Result<()> {
        self.ensure_active()?;
        if self.knowledge.contains_key(&item.id) {
            return Err(EngineError::InvariantViolation(format!(
                "knowledge {} already exists",
                item.id
            )));
        }
        for holder in holders {
            self.ensure_character(holder)?;
        }

        for holder in holders {
            if let Some(character) = self.characters.get_mut(holder) {
                character.learn(item.id.clone());
            }
        }
        self.knowledge.insert(item.id.clone(), item);
        Ok(())
    }

    /// Open a new tension
    pub fn add_tension(&mut self, tension: Tension) -> Result<()> {
        self.ensure_active()?;
        if self.tensions.contains_key(&tension.id) {
            return Err(EngineError::InvariantViolation(format!(
                "tension {} already exists",
                tension.id
            )));
        }
        for p in &tension.participants {
            self.ensure_character(p)?;
        }
        self.tensions.insert(tension.id.clone(), tension);
        Ok(())
    }

    /// Apply one declared effect to a tension, all or nothing
    pub fn apply_tension_impact(
        &mut self,
        impact: &TensionImpact,
        cause: EventKind,
        rules: &TensionRules,
    ) -> Result<()> {
        self.ensure_active()?;
        let tick = self.next_tick();

        let current = self
            .tensions
            .get(&impact.tension_id)
            .ok_or_else(|| EngineError::NotFound(format!("tension {}", impact.tension_id)))?;

        let mut updated = current.clone();
        updated.apply(&impact.effect, rules, cause.permits_reescalation(), tick)?;

        if updated.status() != current.status() {
            debug!(
                "Tension {} {} -> {} (intensity {:.2})",
                updated.id,
                current.status(),
                updated.status(),
                updated.intensity()
            );
        }
        self.tensions.insert(updated.id.clone(), updated);
        Ok(())
    }

    /// Commit the tick: bump the counter and move the clock forward
    pub fn advance_tick(&mut self, duration: Duration) -> Result<u64> {
        self.ensure_active()?;
        if duration < Duration::zero() {
            return Err(EngineError::InvariantViolation(format!(
                "tick duration must not be negative ({})",
                duration
            )));
        }

        self.meta.tick += 1;
        self.meta.clock.current += duration;
        Ok(self.meta.tick)
    }

    /// Archive the world as complete; no-op once terminal
    pub fn mark_complete(&mut self) -> bool {
        if self.meta.status.is_terminal() {
            return false;
        }
        self.meta.status = UniverseStatus::Complete;
        true
    }

    /// Archive the world as failed; no-op once terminal
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> bool {
        if self.meta.status.is_terminal() {
            return false;
        }
        self.meta.status = UniverseStatus::Failed {
            reason: reason.into(),
        };
        true
    }
}
