// src/engine/tick_engine.rs
//! Tick engine
//!
//! One call to `advance` moves a world forward by exactly one tick:
//!
//! ```text
//!  plan ──▶ materialize tasks ──▶ await (deadline) ──▶ integrate ──▶ commit
//!   │                                  │
//!   └─ fails: fallback plan once       └─ timeout: cancel the rest, keep
//!                                         what finished
//! ```
//!
//! Integration runs against a copy of the world that replaces the original
//! only once the tick is committed. A tick that errors out therefore leaves
//! the world exactly at the previous tick.

use crate::engine::cadence::TickCadence;
use crate::engine::planner::{EventPlanner, PlannedEvent, PlanningInput};
use crate::engine::progress::{Phase, ProgressReporter};
use crate::engine::tasks::{register_compose_handler, ComposePayload, COMPOSE_ARTIFACT};
use crate::gateway::{GenerationContext, GenerationGateway};
use crate::scheduler::{TaskError, TaskId, TaskOptions, TaskOutcome, TaskScheduler};
use crate::utils::config::TickConfig;
use crate::utils::errors::{EngineError, Result};
use crate::world::event::{Artifact, WorldEvent};
use crate::world::ids::{ArtifactId, EventId, KnowledgeId, TensionId};
use crate::world::knowledge::{KnowledgeItem, Provenance};
use crate::world::state::WorldState;
use crate::world::tension::{Tension, TensionRules};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Confidence of facts minted by revelations
const REVEALED_CONFIDENCE: f64 = 0.8;

/// Simulated minutes between messages of one thread
const REPLY_SPACING_MINUTES: i64 = 20;

/// Per-call overrides
#[derive(Debug, Clone, Default)]
pub struct TickOptions {
    /// Simulated duration of this tick; cadence policy when unset
    pub duration: Option<chrono::Duration>,

    /// Generation budget; `tick.tick_timeout_secs` when unset
    pub timeout: Option<Duration>,

    /// Hard deadline (the universe's wall-clock ceiling)
    pub deadline: Option<Instant>,
}

impl TickOptions {
    pub fn with_duration(mut self, duration: chrono::Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Summary of one committed tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickResult {
    pub tick: u64,
    pub events_planned: usize,
    pub artifacts_produced: usize,

    /// Tasks that ended failed (including cancelled ones)
    pub tasks_failed: usize,

    /// Tasks cut off by the tick deadline
    pub tasks_cancelled: usize,

    pub tensions_created: Vec<TensionId>,
    pub tensions_resolved: Vec<TensionId>,
    pub knowledge_minted: Vec<KnowledgeId>,

    /// The planner failed and the fallback plan was used
    pub used_fallback: bool,

    /// The generation phase hit its deadline
    pub timed_out: bool,

    pub sim_duration_minutes: i64,
    pub wall_time_ms: u64,
    pub last_event_summary: Option<String>,
}

/// Tasks scheduled for one tick
///
/// Dropping the set cancels whatever is still unsettled and purges the rest,
/// so an abandoned tick (error, deadline or a dropped `advance` future) never
/// leaves handlers running against the gateway.
struct TickTasks {
    scheduler: TaskScheduler,
    ids: Vec<TaskId>,
}

impl TickTasks {
    fn new(scheduler: TaskScheduler) -> Self {
        Self {
            scheduler,
            ids: Vec::new(),
        }
    }

    fn push(&mut self, id: TaskId) {
        self.ids.push(id);
    }

    fn ids(&self) -> &[TaskId] {
        &self.ids
    }
}

impl Drop for TickTasks {
    fn drop(&mut self) {
        let cancelled = self.scheduler.cancel_many(&self.ids);
        if cancelled > 0 {
            warn!("Abandoned tick: cancelled {} unsettled tasks", cancelled);
        }
        let purged = self.scheduler.purge_settled(&self.ids);
        debug!("Purged {} settled tasks", purged);
    }
}

/// One planned event with its scheduled messages
struct Materialized {
    plan: PlannedEvent,
    event_id: EventId,
    sim_time: chrono::DateTime<chrono::Utc>,
    tasks: Vec<(TaskId, ArtifactId)>,
}

pub struct TickEngine {
    config: TickConfig,
    scheduler: TaskScheduler,
    planner: Arc<dyn EventPlanner>,
    cadence: TickCadence,
    rules: TensionRules,
    progress: Option<ProgressReporter>,
}

impl TickEngine {
    /// Build an engine and register its task handlers on `scheduler`
    pub fn new(
        config: TickConfig,
        scheduler: TaskScheduler,
        gateway: Arc<dyn GenerationGateway>,
        planner: Arc<dyn EventPlanner>,
    ) -> Result<Self> {
        register_compose_handler(&scheduler, gateway)?;

        Ok(Self {
            cadence: TickCadence::from_config(&config),
            rules: TensionRules {
                activation_threshold: config.activation_threshold,
                climax_threshold: config.climax_threshold,
                allow_reescalation: config.allow_reescalation,
            },
            config,
            scheduler,
            planner,
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn set_progress(&mut self, progress: ProgressReporter) {
        self.progress = Some(progress);
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn rules(&self) -> &TensionRules {
        &self.rules
    }

    fn phase(&self, phase: Phase) {
        if let Some(progress) = &self.progress {
            progress.set_phase(phase);
        }
    }

    /// Advance `world` by one tick
    #[instrument(skip_all, fields(world = %world.id(), tick = world.next_tick()))]
    pub async fn advance(&mut self, world: &mut WorldState, options: TickOptions) -> Result<TickResult> {
        if world.status().is_terminal() {
            return Err(EngineError::UniverseFailed(format!(
                "world {} is {}",
                world.id(),
                world.status().as_str()
            )));
        }

        let started = Instant::now();
        let tick = world.next_tick();
        let duration = options
            .duration
            .unwrap_or_else(|| self.cadence.duration_for(world.max_open_intensity()));

        // 1. plan
        self.phase(Phase::Planning);
        let (mut planned, used_fallback) = self.plan(world, tick, duration).await?;
        if planned.len() > self.config.max_events {
            warn!(
                "Planner proposed {} events, keeping the first {}",
                planned.len(),
                self.config.max_events
            );
            planned.truncate(self.config.max_events);
        }
        if !used_fallback && planned.len() < self.config.min_events {
            warn!(
                "Planner proposed {} events (minimum {})",
                planned.len(),
                self.config.min_events
            );
        }
        let events_planned = planned.len();

        // 2. materialize
        let mut tasks = TickTasks::new(self.scheduler.clone());
        let materialized = self.materialize(world, tick, duration, planned, &mut tasks)?;

        // 3. await
        self.phase(Phase::Generating);
        let deadline = {
            let timeout = started + options.timeout.unwrap_or_else(|| self.config.tick_timeout());
            options.deadline.map_or(timeout, |d| d.min(timeout))
        };
        let (outcomes, tasks_cancelled) = self.collect(tasks.ids(), deadline).await;
        let timed_out = tasks_cancelled > 0;

        // 4. integrate on a copy
        self.phase(Phase::Integrating);
        let mut next = world.clone();
        let mut result = TickResult {
            tick,
            events_planned,
            artifacts_produced: 0,
            tasks_failed: 0,
            tasks_cancelled,
            tensions_created: Vec::new(),
            tensions_resolved: Vec::new(),
            knowledge_minted: Vec::new(),
            used_fallback,
            timed_out,
            sim_duration_minutes: duration.num_minutes(),
            wall_time_ms: 0,
            last_event_summary: None,
        };

        for (index, event) in materialized.into_iter().enumerate() {
            self.integrate(&mut next, index, event, &outcomes, &mut result)?;
        }

        next.advance_tick(duration)?;
        result.last_event_summary = next.events().last().filter(|e| e.tick == tick).map(WorldEvent::summary);
        *world = next;
        drop(tasks);

        let wall = started.elapsed();
        result.wall_time_ms = wall.as_millis() as u64;

        metrics::counter!("worldsim_ticks_total").increment(1);
        metrics::counter!("worldsim_artifacts_produced_total").increment(result.artifacts_produced as u64);
        metrics::histogram!("worldsim_tick_duration_seconds").record(wall.as_secs_f64());
        if used_fallback {
            metrics::counter!("worldsim_tick_fallbacks_total").increment(1);
        }

        if let Some(progress) = &self.progress {
            progress.tick_committed(tick, result.last_event_summary.clone());
        }

        info!(
            "Tick {} committed: {} events, {} artifacts, {} failed tasks{}",
            tick,
            result.events_planned,
            result.artifacts_produced,
            result.tasks_failed,
            if timed_out { " (timed out)" } else { "" }
        );

        Ok(result)
    }

    /// Run the planner, falling back once to the simplified plan
    async fn plan(
        &self,
        world: &WorldState,
        tick: u64,
        duration: chrono::Duration,
    ) -> Result<(Vec<PlannedEvent>, bool)> {
        let input = PlanningInput {
            world,
            tick,
            tick_duration: duration,
            min_events: self.config.min_events,
            max_events: self.config.max_events,
            rules: self.rules,
        };

        match self.planner.plan(&input).await {
            Ok(events) => Ok((events, false)),
            Err(e) => {
                warn!("Planning tick {} failed, using fallback plan: {}", tick, e);
                match self.planner.fallback_plan(&input).await {
                    Ok(events) => Ok((events, true)),
                    Err(fallback) => Err(EngineError::TickFailed {
                        tick,
                        reason: format!("planning failed ({}); fallback failed ({})", e, fallback),
                    }),
                }
            }
        }
    }

    /// Turn planned messages into scheduled tasks
    ///
    /// A reply depends on the task of the message it answers, so it is only
    /// generated (and integrated) after its parent exists.
    fn materialize(
        &self,
        world: &WorldState,
        tick: u64,
        duration: chrono::Duration,
        planned: Vec<PlannedEvent>,
        scheduled: &mut TickTasks,
    ) -> Result<Vec<Materialized>> {
        let count = planned.len() as i32;
        let mut out = Vec::with_capacity(planned.len());

        for (index, mut plan) in planned.into_iter().enumerate() {
            let event_id = EventId::for_tick(tick, index);
            let sim_time = world.clock().current + duration * (index as i32 + 1) / (count + 1);

            plan.participants.retain(|p| world.character(p).is_some());
            plan.participants.dedup();

            let mut tasks: Vec<(TaskId, ArtifactId)> = Vec::with_capacity(plan.messages.len());
            let priority = (count as u32).saturating_sub(index as u32);

            for (n, message) in plan.messages.iter().enumerate() {
                let artifact_id = ArtifactId::for_message(&event_id, n);

                let parent = match message.reply_to {
                    Some(p) if p < n => Some(p),
                    Some(p) => {
                        warn!("{}: message {} replies to later message {}, ignoring", event_id, n, p);
                        None
                    }
                    None => None,
                };

                let author = world.character(&message.author);
                let knowledge_refs: Vec<KnowledgeId> = message
                    .knowledge_refs
                    .iter()
                    .filter(|k| author.is_some_and(|a| a.knows(k)))
                    .cloned()
                    .collect();
                if knowledge_refs.len() < message.knowledge_refs.len() {
                    debug!("{}: dropped facts the author does not hold", artifact_id);
                }

                let context = GenerationContext {
                    world: world.name().to_string(),
                    event: plan.description.clone(),
                    recipients: message
                        .recipients
                        .iter()
                        .map(|r| world.character(r).map_or_else(|| r.to_string(), |c| c.name.clone()))
                        .collect(),
                    facts: knowledge_refs
                        .iter()
                        .filter_map(|k| world.knowledge_item(k).map(|item| item.fact.clone()))
                        .collect(),
                    thread: Vec::new(),
                };

                let payload = ComposePayload {
                    artifact_id: artifact_id.clone(),
                    event_id: event_id.clone(),
                    tick,
                    author: message.author.clone(),
                    recipients: message.recipients.clone(),
                    subject: message.subject.clone(),
                    prompt: message.prompt.clone(),
                    context,
                    knowledge_refs,
                    in_reply_to: parent.map(|p| ArtifactId::for_message(&event_id, p)),
                    sent_at: sim_time + chrono::Duration::minutes(REPLY_SPACING_MINUTES * n as i64),
                };

                let mut options = TaskOptions::new().with_priority(priority);
                if let Some(p) = parent {
                    options = options.depends_on(tasks[p].0.clone());
                }

                let task_id = self
                    .scheduler
                    .enqueue(COMPOSE_ARTIFACT, serde_json::to_value(&payload)?, options)?;
                scheduled.push(task_id.clone());
                tasks.push((task_id, artifact_id));
            }

            out.push(Materialized {
                plan,
                event_id,
                sim_time,
                tasks,
            });
        }

        Ok(out)
    }

    /// Wait for every task until `deadline`, then cancel whatever is left
    ///
    /// Returns the outcome of every task and how many were cut off.
    async fn collect(&self, ids: &[TaskId], deadline: Instant) -> (HashMap<TaskId, TaskOutcome>, usize) {
        let total = ids.len();
        let mut outcomes: HashMap<TaskId, TaskOutcome> = HashMap::with_capacity(total);

        let waiting = async {
            let mut pending: FuturesUnordered<_> = ids
                .iter()
                .map(|id| async move { (id.clone(), self.scheduler.await_result(id).await) })
                .collect();

            while let Some((id, outcome)) = pending.next().await {
                outcomes.insert(id, outcome);
                if let Some(progress) = &self.progress {
                    progress.set_tasks(outcomes.len(), total);
                }
            }
        };

        let mut cancelled = 0;
        if tokio::time::timeout_at(deadline, waiting).await.is_err() {
            warn!(
                "Tick deadline reached with {} of {} tasks unsettled",
                total - outcomes.len(),
                total
            );
            let unsettled: Vec<TaskId> = ids
                .iter()
                .filter(|id| !outcomes.contains_key(*id))
                .cloned()
                .collect();
            cancelled = self.scheduler.cancel_many(&unsettled);
            for id in ids {
                if !outcomes.contains_key(id) {
                    let outcome = self.scheduler.await_result(id).await;
                    outcomes.insert(id.clone(), outcome);
                }
            }
        }

        (outcomes, cancelled)
    }

    /// Fold one event and its finished messages into the world
    fn integrate(
        &self,
        world: &mut WorldState,
        index: usize,
        event: Materialized,
        outcomes: &HashMap<TaskId, TaskOutcome>,
        result: &mut TickResult,
    ) -> Result<()> {
        let Materialized {
            plan,
            event_id,
            sim_time,
            tasks,
        } = event;
        let tick = world.next_tick();

        let mut applied = Vec::with_capacity(plan.impacts.len());
        for impact in &plan.impacts {
            let was_resolved = world
                .tension(&impact.tension_id)
                .is_some_and(Tension::is_resolved);

            match world.apply_tension_impact(impact, plan.kind, &self.rules) {
                Ok(()) => {
                    let now_resolved = world
                        .tension(&impact.tension_id)
                        .is_some_and(Tension::is_resolved);
                    if now_resolved && !was_resolved {
                        result.tensions_resolved.push(impact.tension_id.clone());
                    }
                    applied.push(impact.clone());
                }
                Err(e) => warn!("{}: skipping tension effect: {}", event_id, e),
            }
        }

        let mut spawned = Vec::new();
        if let Some(new) = &plan.new_tension {
            let id = TensionId::spawned(tick, index);
            let tension = Tension::new(
                id.clone(),
                new.kind,
                new.description.clone(),
                new.participants.clone(),
                new.intensity,
                tick,
            );
            match world.add_tension(tension) {
                Ok(()) => {
                    result.tensions_created.push(id.clone());
                    spawned.push(id);
                }
                Err(e) => warn!("{}: skipping new tension: {}", event_id, e),
            }
        }

        let mut revealed = None;
        if plan.kind.reveals_knowledge() && !plan.participants.is_empty() {
            let id = KnowledgeId::minted(tick, index);
            let item = KnowledgeItem::new(
                id.clone(),
                plan.description.clone(),
                Provenance::Event {
                    event_id: event_id.clone(),
                },
                REVEALED_CONFIDENCE,
                tick,
            );
            match world.mint_knowledge(item, &plan.participants) {
                Ok(()) => {
                    result.knowledge_minted.push(id.clone());
                    revealed = Some(id);
                }
                Err(e) => warn!("{}: skipping revealed fact: {}", event_id, e),
            }
        }

        world.record_event(WorldEvent {
            id: event_id.clone(),
            tick,
            kind: plan.kind,
            description: plan.description,
            participants: plan.participants,
            impacts: applied,
            spawned_tensions: spawned,
            revealed,
            sim_time,
        })?;

        // message order puts every parent before its replies
        for (task_id, artifact_id) in tasks {
            match outcomes.get(&task_id) {
                Some(Ok(value)) => {
                    let artifact: Artifact = match serde_json::from_value(value.clone()) {
                        Ok(artifact) => artifact,
                        Err(e) => {
                            warn!("{}: undecodable task output: {}", artifact_id, e);
                            result.tasks_failed += 1;
                            continue;
                        }
                    };
                    match world.record_artifact(artifact) {
                        Ok(()) => result.artifacts_produced += 1,
                        Err(e) => {
                            warn!("{}: rejected: {}", artifact_id, e);
                            result.tasks_failed += 1;
                        }
                    }
                }
                Some(Err(TaskError::Cancelled)) => {
                    debug!("{}: cancelled at deadline", artifact_id);
                    result.tasks_failed += 1;
                }
                Some(Err(e)) => {
                    warn!("{}: no artifact ({})", artifact_id, e);
                    result.tasks_failed += 1;
                }
                None => {
                    warn!("{}: task {} has no outcome", artifact_id, task_id);
                    result.tasks_failed += 1;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::planner::{HeuristicPlanner, PlannedMessage, PlannedTension};
    use crate::gateway::{GatewayError, PersonaGateway, TemplateProvider};
    use crate::utils::config::GatewayConfig;
    use crate::world::event::{EventKind, TensionImpact};
    use crate::world::ids::CharacterId;
    use crate::world::tension::{TensionEffect, TensionKind, TensionStatus};
    use crate::world::testing::office_world;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn gateway_for(world: &WorldState) -> Arc<PersonaGateway> {
        let gateway = PersonaGateway::new(GatewayConfig::immediate())
            .with_provider(Arc::new(TemplateProvider::new()));
        gateway.bind_world(world).unwrap();
        Arc::new(gateway)
    }

    fn engine(world: &WorldState, planner: Arc<dyn EventPlanner>) -> TickEngine {
        TickEngine::new(
            TickConfig::default(),
            TaskScheduler::with_concurrency(4),
            gateway_for(world),
            planner,
        )
        .unwrap()
    }

    fn message(author: &str, to: &str, reply_to: Option<usize>) -> PlannedMessage {
        PlannedMessage {
            author: CharacterId::from(author),
            recipients: vec![CharacterId::from(to)],
            subject: "subject".into(),
            prompt: "prompt".into(),
            reply_to,
            knowledge_refs: vec![],
        }
    }

    /// Returns a fixed plan; fails the first `failures` calls
    struct FixedPlanner {
        events: Vec<PlannedEvent>,
        failures: AtomicU32,
        fallback_fails: bool,
    }

    #[async_trait]
    impl EventPlanner for FixedPlanner {
        async fn plan(&self, _input: &PlanningInput<'_>) -> Result<Vec<PlannedEvent>> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(EngineError::PlanningFailed("model offline".into()));
            }
            Ok(self.events.clone())
        }

        async fn fallback_plan(&self, _input: &PlanningInput<'_>) -> Result<Vec<PlannedEvent>> {
            if self.fallback_fails {
                Err(EngineError::PlanningFailed("fallback offline".into()))
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn fixed(events: Vec<PlannedEvent>) -> Arc<FixedPlanner> {
        Arc::new(FixedPlanner {
            events,
            failures: AtomicU32::new(0),
            fallback_fails: false,
        })
    }

    fn event(kind: EventKind, messages: Vec<PlannedMessage>) -> PlannedEvent {
        PlannedEvent {
            kind,
            description: format!("{} event", kind.as_str()),
            participants: vec![CharacterId::from("alice"), CharacterId::from("bob")],
            impacts: vec![],
            messages,
            new_tension: None,
        }
    }

    #[tokio::test]
    async fn test_tick_advances_world() {
        let mut world = office_world();
        let mut engine = engine(&world, Arc::new(HeuristicPlanner::new()));
        let start = world.clock().current;

        let result = engine.advance(&mut world, TickOptions::default()).await.unwrap();

        assert_eq!(result.tick, 1);
        assert_eq!(world.tick(), 1);
        assert!(world.clock().current > start);
        assert!((2..=5).contains(&result.events_planned));
        assert_eq!(world.events().len(), result.events_planned);
        assert_eq!(world.artifacts().len(), result.artifacts_produced);
        assert!(world.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn test_thread_integrates_in_order() {
        let mut world = office_world();
        let planner = fixed(vec![event(
            EventKind::Meeting,
            vec![
                message("alice", "bob", None),
                message("bob", "alice", Some(0)),
                message("alice", "bob", Some(1)),
            ],
        )]);
        let mut engine = engine(&world, planner);

        let result = engine.advance(&mut world, TickOptions::default()).await.unwrap();

        assert_eq!(result.artifacts_produced, 3);
        let artifacts = world.artifacts();
        assert_eq!(artifacts[1].in_reply_to.as_ref(), Some(&artifacts[0].id));
        assert_eq!(artifacts[2].in_reply_to.as_ref(), Some(&artifacts[1].id));
        assert!(artifacts[1].body.contains("> "));
    }

    #[tokio::test]
    async fn test_unbound_author_yields_no_artifact() {
        let mut world = office_world();
        let planner = fixed(vec![
            event(EventKind::Meeting, vec![message("alice", "bob", None)]),
            event(EventKind::Meeting, vec![message("dave", "bob", None)]),
            event(EventKind::Meeting, vec![message("carol", "bob", None)]),
        ]);
        let mut engine = engine(&world, planner);

        let result = engine.advance(&mut world, TickOptions::default()).await.unwrap();

        assert_eq!(result.events_planned, 3);
        assert_eq!(result.artifacts_produced, 2);
        assert_eq!(result.tasks_failed, 1);
        assert_eq!(world.tick(), 1);
        assert_eq!(world.artifacts_for_event(&EventId::for_tick(1, 1)).count(), 0);
    }

    #[tokio::test]
    async fn test_failed_parent_drops_reply() {
        let mut world = office_world();
        let planner = fixed(vec![event(
            EventKind::Meeting,
            vec![message("dave", "bob", None), message("bob", "dave", Some(0))],
        )]);
        let mut engine = engine(&world, planner);

        let result = engine.advance(&mut world, TickOptions::default()).await.unwrap();

        assert_eq!(result.artifacts_produced, 0);
        assert_eq!(result.tasks_failed, 2);
    }

    #[tokio::test]
    async fn test_planning_failure_uses_fallback() {
        let mut world = office_world();
        let planner = Arc::new(FixedPlanner {
            events: vec![],
            failures: AtomicU32::new(1),
            fallback_fails: false,
        });
        let mut engine = engine(&world, planner);

        let result = engine.advance(&mut world, TickOptions::default()).await.unwrap();

        assert!(result.used_fallback);
        assert_eq!(result.events_planned, 0);
        assert_eq!(world.tick(), 1);
    }

    #[tokio::test]
    async fn test_fallback_failure_fails_tick_without_changes() {
        let mut world = office_world();
        let planner = Arc::new(FixedPlanner {
            events: vec![],
            failures: AtomicU32::new(1),
            fallback_fails: true,
        });
        let mut engine = engine(&world, planner);

        let err = engine.advance(&mut world, TickOptions::default()).await.unwrap_err();

        assert!(matches!(err, EngineError::TickFailed { tick: 1, .. }));
        assert_eq!(world.tick(), 0);
    }

    #[tokio::test]
    async fn test_revelation_applies_effects_and_mints_fact() {
        let mut world = office_world();
        let mut planned = event(EventKind::Revelation, vec![message("alice", "bob", None)]);
        planned.impacts = vec![
            TensionImpact {
                tension_id: TensionId::from("t_budget"),
                effect: TensionEffect::Intensify { delta: 0.4 },
            },
            TensionImpact {
                tension_id: TensionId::from("t_missing"),
                effect: TensionEffect::Resolve,
            },
        ];
        planned.new_tension = Some(PlannedTension {
            kind: TensionKind::Competition,
            description: "Both want the lead role".into(),
            participants: vec![CharacterId::from("alice"), CharacterId::from("carol")],
            intensity: 0.3,
        });
        let mut engine = engine(&world, fixed(vec![planned]));

        let result = engine.advance(&mut world, TickOptions::default()).await.unwrap();

        let budget = world.tension(&TensionId::from("t_budget")).unwrap();
        assert_eq!(budget.status(), TensionStatus::Climax);
        assert!((budget.intensity() - 0.9).abs() < 1e-9);

        assert_eq!(result.tensions_created, vec![TensionId::spawned(1, 0)]);
        assert!(world.tension(&TensionId::spawned(1, 0)).is_some());

        let fact = KnowledgeId::minted(1, 0);
        assert_eq!(result.knowledge_minted, vec![fact.clone()]);
        assert!(world.character(&CharacterId::from("bob")).unwrap().knows(&fact));

        // the unknown tension is skipped, not recorded
        let recorded = world.event(&EventId::for_tick(1, 0)).unwrap();
        assert_eq!(recorded.impacts.len(), 1);
        assert_eq!(recorded.revealed.as_ref(), Some(&fact));
    }

    #[tokio::test]
    async fn test_duration_override() {
        let mut world = office_world();
        let mut engine = engine(&world, fixed(vec![]));
        let start = world.clock().current;

        let result = engine
            .advance(
                &mut world,
                TickOptions::default().with_duration(chrono::Duration::minutes(15)),
            )
            .await
            .unwrap();

        assert_eq!(result.sim_duration_minutes, 15);
        assert_eq!(world.clock().current, start + chrono::Duration::minutes(15));
    }

    /// Never answers until cancelled
    struct StuckGateway;

    #[async_trait]
    impl GenerationGateway for StuckGateway {
        async fn generate_as_persona(
            &self,
            _character: &CharacterId,
            _prompt: &str,
            _context: &GenerationContext,
        ) -> std::result::Result<String, GatewayError> {
            futures::future::pending::<()>().await;
            Err(GatewayError::Provider("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_timeout_cancels_and_still_commits() {
        let mut world = office_world();
        let planner = fixed(vec![event(EventKind::Meeting, vec![message("alice", "bob", None)])]);
        let mut engine = TickEngine::new(
            TickConfig::default(),
            TaskScheduler::with_concurrency(2),
            Arc::new(StuckGateway),
            planner,
        )
        .unwrap();

        let result = engine
            .advance(
                &mut world,
                TickOptions::default().with_timeout(Duration::from_millis(50)),
            )
            .await
            .unwrap();

        assert!(result.timed_out);
        assert_eq!(result.tasks_cancelled, 1);
        assert_eq!(result.artifacts_produced, 0);
        assert_eq!(world.tick(), 1);
        assert_eq!(engine.scheduler().stats().running, 0);
    }

    #[tokio::test]
    async fn test_dropped_tick_cancels_its_tasks() {
        let mut world = office_world();
        let planner = fixed(vec![event(
            EventKind::Meeting,
            vec![message("alice", "bob", None), message("bob", "alice", Some(0))],
        )]);
        let mut engine = TickEngine::new(
            TickConfig::default(),
            TaskScheduler::with_concurrency(2),
            Arc::new(StuckGateway),
            planner,
        )
        .unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            engine.advance(&mut world, TickOptions::default()),
        )
        .await;
        assert!(abandoned.is_err());

        let stats = engine.scheduler().stats();
        assert_eq!(stats.in_flight(), 0);
        assert_eq!(stats.failed, 2);
        assert_eq!(world.tick(), 0);
    }

    #[tokio::test]
    async fn test_terminal_world_rejected() {
        let mut world = office_world();
        world.mark_complete();
        let mut engine = engine(&world, fixed(vec![]));
        assert!(engine.advance(&mut world, TickOptions::default()).await.is_err());
    }
}
