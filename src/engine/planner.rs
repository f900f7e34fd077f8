// src/engine/planner.rs
//! Event planning
//!
//! A planner looks at the world as of the last committed tick and proposes the
//! next tick's events. It never sees a tick in progress.
//!
//! `HeuristicPlanner` is seeded from (world planner seed, tick), so the same
//! world at the same tick always yields the same plan. That is what lets a
//! resumed universe reproduce the tick an uninterrupted run would have made.

use crate::utils::errors::{EngineError, Result};
use crate::world::character::Character;
use crate::world::event::{EventKind, TensionImpact};
use crate::world::ids::{CharacterId, KnowledgeId};
use crate::world::state::WorldState;
use crate::world::tension::{Tension, TensionEffect, TensionKind, TensionRules, TensionStatus};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// What a planner gets to read
pub struct PlanningInput<'a> {
    pub world: &'a WorldState,

    /// Tick being planned
    pub tick: u64,

    /// Simulated time this tick will cover
    pub tick_duration: chrono::Duration,

    pub min_events: usize,
    pub max_events: usize,
    pub rules: TensionRules,
}

/// One message to generate for an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedMessage {
    pub author: CharacterId,
    pub recipients: Vec<CharacterId>,
    pub subject: String,
    pub prompt: String,

    /// Index of the earlier message in the same event this one answers
    pub reply_to: Option<usize>,

    /// Facts the author may cite; drawn from the author's own knowledge
    pub knowledge_refs: Vec<KnowledgeId>,
}

/// A tension an event opens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTension {
    pub kind: TensionKind,
    pub description: String,
    pub participants: Vec<CharacterId>,
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedEvent {
    pub kind: EventKind,
    pub description: String,
    pub participants: Vec<CharacterId>,
    pub impacts: Vec<TensionImpact>,
    pub messages: Vec<PlannedMessage>,
    pub new_tension: Option<PlannedTension>,
}

#[async_trait]
pub trait EventPlanner: Send + Sync {
    /// Propose this tick's events
    async fn plan(&self, input: &PlanningInput<'_>) -> Result<Vec<PlannedEvent>>;

    /// Simplified plan used once after `plan` fails; default skips event
    /// generation so the clock still advances
    async fn fallback_plan(&self, _input: &PlanningInput<'_>) -> Result<Vec<PlannedEvent>> {
        Ok(Vec::new())
    }
}

/// Probability that a tick opens a new tension
const NEW_TENSION_CHANCE: f64 = 0.2;

/// Probability that a resolving tension flares up again
const REESCALATION_CHANCE: f64 = 0.15;

/// Ticks covering at least this many hours are quiet stretches
const QUIET_STRETCH_HOURS: i64 = 24;

/// Kinds for events no tension drives
const FILLER_KINDS: [EventKind; 3] = [EventKind::Routine, EventKind::Meeting, EventKind::Deadline];

/// Deterministic, rule-based planner
#[derive(Debug, Clone, Default)]
pub struct HeuristicPlanner;

impl HeuristicPlanner {
    pub fn new() -> Self {
        Self
    }

    fn rng_for(world: &WorldState, tick: u64) -> StdRng {
        StdRng::seed_from_u64(world.planner_seed() ^ tick.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    fn event_for_tension(
        rng: &mut StdRng,
        tension: &Tension,
        rules: &TensionRules,
    ) -> (EventKind, TensionEffect) {
        match tension.status() {
            TensionStatus::Building => (
                kind_for(tension.kind),
                TensionEffect::Intensify {
                    delta: rng.gen_range(0.1..0.25),
                },
            ),
            TensionStatus::Active => {
                if tension.intensity() >= 0.7 && rng.gen_bool(0.3) {
                    (EventKind::Crisis, TensionEffect::Climax)
                } else {
                    (
                        kind_for(tension.kind),
                        TensionEffect::Intensify {
                            delta: rng.gen_range(0.1..0.3),
                        },
                    )
                }
            }
            TensionStatus::Climax => (EventKind::Meeting, TensionEffect::BeginResolution),
            TensionStatus::Resolving | TensionStatus::Resolved => {
                if rules.allow_reescalation && rng.gen_bool(REESCALATION_CHANCE) {
                    let kind = if rng.gen_bool(0.5) {
                        EventKind::Revelation
                    } else {
                        EventKind::Betrayal
                    };
                    (kind, TensionEffect::Reescalate)
                } else if rng.gen_bool(0.5) {
                    (EventKind::Meeting, TensionEffect::Resolve)
                } else {
                    (
                        EventKind::Meeting,
                        TensionEffect::Ease {
                            delta: rng.gen_range(0.1..0.2),
                        },
                    )
                }
            }
        }
    }

    /// Opening message plus up to two replies, each answering the previous one
    fn thread(
        rng: &mut StdRng,
        world: &WorldState,
        authors: &[&Character],
        participants: &[CharacterId],
        subject: &str,
        description: &str,
    ) -> Vec<PlannedMessage> {
        let Some(first) = authors.first() else {
            return Vec::new();
        };

        let replies = if authors.len() > 1 { rng.gen_range(0..=2) } else { 0 };
        let mut messages = Vec::with_capacity(1 + replies);

        for index in 0..=replies {
            let author = if index == 0 {
                *first
            } else {
                authors[index % authors.len()]
            };

            let mut recipients: Vec<CharacterId> = participants
                .iter()
                .filter(|p| *p != &author.id)
                .cloned()
                .collect();
            if recipients.is_empty() {
                if let Some(other) = world.characters().find(|c| c.id != author.id) {
                    recipients.push(other.id.clone());
                }
            }

            let knowledge_refs: Vec<KnowledgeId> = if rng.gen_bool(0.5) {
                let known: Vec<&KnowledgeId> = author.knowledge.iter().collect();
                known.choose(rng).map(|k| vec![(*k).clone()]).unwrap_or_default()
            } else {
                Vec::new()
            };

            let (title, prompt, reply_to) = if index == 0 {
                (
                    subject.to_string(),
                    format!("Start a thread about: {}", description),
                    None,
                )
            } else {
                (
                    format!("Re: {}", subject),
                    format!("Reply to the previous message about: {}", description),
                    Some(index - 1),
                )
            };

            messages.push(PlannedMessage {
                author: author.id.clone(),
                recipients,
                subject: title,
                prompt,
                reply_to,
                knowledge_refs,
            });
        }

        messages
    }
}

fn kind_for(tension: TensionKind) -> EventKind {
    match tension {
        TensionKind::Conflict => EventKind::Conflict,
        TensionKind::Secret | TensionKind::Mystery => EventKind::Discovery,
        TensionKind::Desire | TensionKind::Opportunity => EventKind::Opportunity,
        TensionKind::Alliance => EventKind::Alliance,
        TensionKind::Competition => EventKind::Deadline,
        TensionKind::Revelation => EventKind::Revelation,
        TensionKind::Betrayal => EventKind::Betrayal,
    }
}

#[async_trait]
impl EventPlanner for HeuristicPlanner {
    async fn plan(&self, input: &PlanningInput<'_>) -> Result<Vec<PlannedEvent>> {
        let world = input.world;
        let writers: Vec<&Character> = world.characters().filter(|c| c.has_persona()).collect();
        if writers.is_empty() {
            return Err(EngineError::PlanningFailed(
                "no character holds a persona binding".to_string(),
            ));
        }

        let mut rng = Self::rng_for(world, input.tick);
        let min = input.min_events.max(1);
        let mut max = input.max_events.max(min);
        if input.tick_duration >= chrono::Duration::hours(QUIET_STRETCH_HOURS) {
            // a quiet day skipped ahead is summarized, not narrated
            max = (min + max) / 2;
        }
        let count = rng.gen_range(min..=max);
        let filler = filler_kinds(world, input.tick);

        let mut hottest: Vec<&Tension> = world.open_tensions().collect();
        hottest.sort_by(|a, b| {
            b.intensity()
                .total_cmp(&a.intensity())
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut events = Vec::with_capacity(count);
        for index in 0..count {
            let (kind, description, mut participants, impacts) = match hottest.get(index) {
                Some(tension) => {
                    let (kind, effect) = Self::event_for_tension(&mut rng, tension, &input.rules);
                    (
                        kind,
                        format!("{} ({})", tension.description, kind.as_str()),
                        tension.participants.clone(),
                        vec![TensionImpact {
                            tension_id: tension.id.clone(),
                            effect,
                        }],
                    )
                }
                None => {
                    let kind = *filler.choose(&mut rng).unwrap_or(&EventKind::Routine);
                    let picked: Vec<CharacterId> = writers
                        .choose_multiple(&mut rng, 2.min(writers.len()))
                        .map(|c| c.id.clone())
                        .collect();
                    (
                        kind,
                        format!("{} at {}", kind.as_str(), world.name()),
                        picked,
                        Vec::new(),
                    )
                }
            };

            let mut authors: Vec<&Character> = participants
                .iter()
                .filter_map(|id| world.character(id))
                .filter(|c| c.has_persona())
                .collect();
            if authors.is_empty() {
                if let Some(stand_in) = writers.choose(&mut rng) {
                    participants.push(stand_in.id.clone());
                    authors.push(*stand_in);
                }
            }

            let subject = format!("{} #{}", capitalize(kind.as_str()), input.tick);
            let messages = Self::thread(
                &mut rng,
                world,
                &authors,
                &participants,
                &subject,
                &description,
            );

            events.push(PlannedEvent {
                kind,
                description,
                participants,
                impacts,
                messages,
                new_tension: None,
            });
        }

        if world.characters().count() >= 2 && rng.gen_bool(NEW_TENSION_CHANCE) {
            let cast: Vec<&Character> = world.characters().collect();
            let pair: Vec<CharacterId> = cast
                .choose_multiple(&mut rng, 2)
                .map(|c| c.id.clone())
                .collect();
            let kind = *TensionKind::ALL
                .choose(&mut rng)
                .unwrap_or(&TensionKind::Conflict);

            if let Some(last) = events.last_mut() {
                last.new_tension = Some(PlannedTension {
                    kind,
                    description: format!("{} between {}", kind.as_str(), join_ids(&pair)),
                    participants: pair,
                    intensity: rng.gen_range(0.1..0.3),
                });
            }
        }

        Ok(events)
    }
}

/// Filler kinds the previous tick did not already use, all of them when it used every one
fn filler_kinds(world: &WorldState, tick: u64) -> Vec<EventKind> {
    let previous: Vec<EventKind> = world
        .recent_events(FILLER_KINDS.len() * 4)
        .iter()
        .filter(|e| e.tick + 1 == tick && e.impacts.is_empty())
        .map(|e| e.kind)
        .collect();

    let fresh: Vec<EventKind> = FILLER_KINDS
        .iter()
        .copied()
        .filter(|k| !previous.contains(k))
        .collect();
    if fresh.is_empty() {
        FILLER_KINDS.to_vec()
    } else {
        fresh
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn join_ids(ids: &[CharacterId]) -> String {
    ids.iter().map(CharacterId::as_str).collect::<Vec<_>>().join(" and ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::event::WorldEvent;
    use crate::world::ids::EventId;
    use crate::world::testing::office_world;

    fn input(world: &WorldState) -> PlanningInput<'_> {
        PlanningInput {
            world,
            tick: world.next_tick(),
            tick_duration: chrono::Duration::hours(4),
            min_events: 2,
            max_events: 5,
            rules: TensionRules::default(),
        }
    }

    #[tokio::test]
    async fn test_plan_size_within_bounds() {
        let world = office_world();
        let events = HeuristicPlanner::new().plan(&input(&world)).await.unwrap();
        assert!((2..=5).contains(&events.len()));
    }

    #[tokio::test]
    async fn test_plan_is_deterministic() {
        let world = office_world();
        let planner = HeuristicPlanner::new();
        let a = planner.plan(&input(&world)).await.unwrap();
        let b = planner.plan(&input(&world)).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_hottest_tension_planned_first() {
        let world = office_world();
        let events = HeuristicPlanner::new().plan(&input(&world)).await.unwrap();
        assert_eq!(events[0].impacts[0].tension_id.as_str(), "t_budget");
    }

    #[tokio::test]
    async fn test_messages_respect_knowledge_and_personas() {
        let world = office_world();
        let events = HeuristicPlanner::new().plan(&input(&world)).await.unwrap();

        for event in &events {
            assert!(!event.messages.is_empty());
            for (i, message) in event.messages.iter().enumerate() {
                let author = world.character(&message.author).unwrap();
                assert!(author.has_persona());
                assert!(message.knowledge_refs.iter().all(|k| author.knows(k)));
                if let Some(parent) = message.reply_to {
                    assert!(parent < i);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_no_writers_fails_planning() {
        let mut seed = crate::world::testing::office_seed();
        for c in &mut seed.characters {
            c.persona = None;
        }
        let world =
            WorldState::from_seed(crate::world::ids::WorldId::from("w"), seed).unwrap();

        let planner = HeuristicPlanner::new();
        assert!(matches!(
            planner.plan(&input(&world)).await,
            Err(EngineError::PlanningFailed(_))
        ));
        assert!(planner.fallback_plan(&input(&world)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quiet_stretch_plans_fewer_events() {
        let world = office_world();
        let planner = HeuristicPlanner::new();

        for tick in 1..20 {
            let quiet = PlanningInput {
                tick,
                tick_duration: chrono::Duration::days(1),
                ..input(&world)
            };
            let events = planner.plan(&quiet).await.unwrap();
            assert!((2..=3).contains(&events.len()), "tick {}: {}", tick, events.len());
        }
    }

    #[tokio::test]
    async fn test_filler_avoids_last_tick_kinds() {
        let mut world = office_world();
        let sim_time = world.clock().current;
        for (n, kind) in [EventKind::Routine, EventKind::Meeting].into_iter().enumerate() {
            world
                .record_event(WorldEvent {
                    id: EventId::for_tick(1, n),
                    tick: 1,
                    kind,
                    description: "filler".into(),
                    participants: vec!["alice".into()],
                    impacts: vec![],
                    spawned_tensions: vec![],
                    revealed: None,
                    sim_time,
                })
                .unwrap();
        }
        world.advance_tick(chrono::Duration::hours(4)).unwrap();

        let busy = PlanningInput {
            min_events: 5,
            max_events: 5,
            ..input(&world)
        };
        let events = HeuristicPlanner::new().plan(&busy).await.unwrap();

        let filler: Vec<&PlannedEvent> = events.iter().filter(|e| e.impacts.is_empty()).collect();
        assert!(!filler.is_empty());
        assert!(filler.iter().all(|e| e.kind == EventKind::Deadline));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("meeting"), "Meeting");
        assert_eq!(capitalize(""), "");
    }
}
