// tests/tick_engine_scenarios.rs
//! End-to-end tick scenarios against the demo seed

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use worldsim_engine::engine::{
    EventPlanner, HeuristicPlanner, PlannedEvent, PlannedMessage, PlanningInput, TickEngine,
    TickOptions, Universe,
};
use worldsim_engine::gateway::{PersonaGateway, TemplateProvider};
use worldsim_engine::scheduler::TaskScheduler;
use worldsim_engine::store::{MemoryWorldStore, SqliteWorldStore, WorldStore};
use worldsim_engine::utils::config::{GatewayConfig, TickConfig, UniverseConfig};
use worldsim_engine::utils::errors::Result;
use worldsim_engine::world::{
    CharacterId, EventId, EventKind, SeedFile, TensionId, TensionStatus, WorldId, WorldSeed,
    WorldState,
};

fn seed_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("seed/world.yaml")
}

async fn demo_seed() -> WorldSeed {
    use worldsim_engine::world::SeedProvider;
    SeedFile::new(seed_path()).load_seed().await.unwrap()
}

async fn demo_world() -> WorldState {
    WorldState::from_seed(WorldId::from("northwind"), demo_seed().await).unwrap()
}

fn gateway() -> Arc<PersonaGateway> {
    Arc::new(
        PersonaGateway::new(GatewayConfig::immediate())
            .with_provider(Arc::new(TemplateProvider::new())),
    )
}

fn engine(gateway: Arc<PersonaGateway>, planner: Arc<dyn EventPlanner>) -> TickEngine {
    TickEngine::new(
        TickConfig::default(),
        TaskScheduler::with_concurrency(4),
        gateway,
        planner,
    )
    .unwrap()
}

/// Always returns the same three events
struct ScriptedPlanner(Vec<PlannedEvent>);

#[async_trait]
impl EventPlanner for ScriptedPlanner {
    async fn plan(&self, _input: &PlanningInput<'_>) -> Result<Vec<PlannedEvent>> {
        Ok(self.0.clone())
    }
}

fn single_message(author: &str, to: &str, description: &str) -> PlannedEvent {
    PlannedEvent {
        kind: EventKind::Meeting,
        description: description.to_string(),
        participants: vec![CharacterId::from(author), CharacterId::from(to)],
        impacts: vec![],
        messages: vec![PlannedMessage {
            author: CharacterId::from(author),
            recipients: vec![CharacterId::from(to)],
            subject: description.to_string(),
            prompt: format!("Write to {} about: {}", to, description),
            reply_to: None,
            knowledge_refs: vec![],
        }],
        new_tension: None,
    }
}

#[tokio::test]
async fn test_failed_task_drops_only_its_artifact() {
    let mut world = demo_world().await;
    let gateway = gateway();
    gateway.bind_world(&world).unwrap();

    // the board office has no persona, so its message fails fatally
    let planner = ScriptedPlanner(vec![
        single_message("maya", "tom", "Freight review"),
        single_message("board", "maya", "Quarterly questions"),
        single_message("lena", "raj", "Harbor Foods visit"),
    ]);
    let mut engine = engine(gateway, Arc::new(planner));

    let result = engine.advance(&mut world, TickOptions::default()).await.unwrap();

    assert_eq!(result.events_planned, 3);
    assert_eq!(result.artifacts_produced, 2);
    assert_eq!(result.tasks_failed, 1);
    assert_eq!(world.tick(), 1);
    assert_eq!(world.events().len(), 3);
    assert_eq!(world.artifacts_for_event(&EventId::for_tick(1, 1)).count(), 0);
    assert_eq!(world.artifacts_for_event(&EventId::for_tick(1, 0)).count(), 1);
    assert_eq!(world.artifacts_for_event(&EventId::for_tick(1, 2)).count(), 1);
}

#[tokio::test]
async fn test_ticks_are_monotonic() {
    let mut world = demo_world().await;
    let gateway = gateway();
    gateway.bind_world(&world).unwrap();
    let mut engine = engine(gateway, Arc::new(HeuristicPlanner::new()));

    let start = world.clock().start;
    for expected in 1..=8 {
        let before_tick = world.tick();
        let before_time = world.clock().current;

        let result = engine.advance(&mut world, TickOptions::default()).await.unwrap();

        assert_eq!(result.tick, expected);
        assert_eq!(world.tick(), before_tick + 1);
        assert!(world.clock().current >= before_time);
        assert!(world.clock().current >= start);
        assert!((2..=5).contains(&result.events_planned));
    }
    assert!(world.check_invariants().is_ok());
}

#[tokio::test]
async fn test_knowledge_bound_holds() {
    let mut world = demo_world().await;
    let gateway = gateway();
    gateway.bind_world(&world).unwrap();
    let mut engine = engine(gateway, Arc::new(HeuristicPlanner::new()));

    for _ in 0..10 {
        engine.advance(&mut world, TickOptions::default()).await.unwrap();
    }

    let mut cited = 0;
    for artifact in world.artifacts() {
        let author = world.character(&artifact.author).unwrap();
        assert!(author.persona.is_some());
        for fact in &artifact.knowledge_refs {
            cited += 1;
            assert!(author.knows(fact), "{} cites unknown {}", artifact.id, fact);
            let item = world.knowledge_item(fact).unwrap();
            assert!(item.created_tick <= artifact.tick);
        }
        for recipient in &artifact.recipients {
            let recipient = world.character(recipient).unwrap();
            assert!(artifact.knowledge_refs.iter().all(|f| recipient.knows(f)));
        }
    }
    assert!(cited > 0, "no artifact referenced any knowledge");
}

#[tokio::test]
async fn test_tension_intensity_never_drops_while_rising() {
    let mut world = demo_world().await;
    let gateway = gateway();
    gateway.bind_world(&world).unwrap();
    let mut engine = engine(gateway, Arc::new(HeuristicPlanner::new()));

    let mut last: HashMap<TensionId, (TensionStatus, f64)> = HashMap::new();
    for _ in 0..15 {
        engine.advance(&mut world, TickOptions::default()).await.unwrap();

        for tension in world.tensions() {
            let now = (tension.status(), tension.intensity());
            if let Some((status, intensity)) = last.get(&tension.id) {
                if status.is_rising() && now.0.is_rising() {
                    assert!(
                        now.1 >= *intensity,
                        "{} dropped from {} to {} while {}",
                        tension.id,
                        intensity,
                        now.1,
                        now.0
                    );
                }
                if *status == TensionStatus::Resolved {
                    assert_eq!(now.0, TensionStatus::Resolved);
                }
            }
            assert!((0.0..=1.0).contains(&now.1));
            last.insert(tension.id.clone(), now);
        }
    }
}

fn universe_config(world_id: &str, target_ticks: u64) -> UniverseConfig {
    UniverseConfig {
        target_ticks,
        world_id: Some(world_id.to_string()),
        ..Default::default()
    }
}

async fn open(store: Arc<dyn WorldStore>, world_id: &str) -> Universe {
    let gateway = gateway();
    let universe = Universe::open(
        universe_config(world_id, 10),
        engine(gateway.clone(), Arc::new(HeuristicPlanner::new())),
        store,
        &demo_seed().await,
    )
    .await
    .unwrap();
    gateway.bind_world(universe.world()).unwrap();
    universe
}

#[tokio::test]
async fn test_restart_reproduces_next_tick() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("worlds.db");

    // run to tick 5 and drop everything
    {
        let store = Arc::new(SqliteWorldStore::open(&db).await.unwrap());
        let mut universe = open(store, "restarted").await;
        for _ in 0..5 {
            universe.step(TickOptions::default()).await.unwrap();
        }
        assert_eq!(universe.world().tick(), 5);
    }

    // a new process resumes from the checkpoint
    let store = Arc::new(SqliteWorldStore::open(&db).await.unwrap());
    let mut resumed = open(store, "restarted").await;
    assert_eq!(resumed.world().tick(), 5);
    let resumed_result = resumed.step(TickOptions::default()).await.unwrap();

    // reference run without the restart
    let mut reference = open(Arc::new(MemoryWorldStore::new()), "reference").await;
    let mut reference_result = None;
    for _ in 0..6 {
        reference_result = Some(reference.step(TickOptions::default()).await.unwrap());
    }
    let reference_result = reference_result.unwrap();

    assert_eq!(resumed_result.tick, 6);
    assert_eq!(resumed_result.events_planned, reference_result.events_planned);
    assert_eq!(resumed_result.artifacts_produced, reference_result.artifacts_produced);
    assert_eq!(resumed_result.sim_duration_minutes, reference_result.sim_duration_minutes);

    let tick_events = |world: &WorldState| {
        world
            .events()
            .iter()
            .filter(|e| e.tick == 6)
            .map(|e| (e.id.clone(), e.kind, e.description.clone(), e.participants.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(tick_events(resumed.world()), tick_events(reference.world()));

    let tick_mail = |world: &WorldState| {
        world
            .artifacts()
            .iter()
            .filter(|a| a.tick == 6)
            .map(|a| (a.id.clone(), a.author.clone(), a.body.clone(), a.sent_at))
            .collect::<Vec<_>>()
    };
    assert_eq!(tick_mail(resumed.world()), tick_mail(reference.world()));
    assert_eq!(resumed.world().clock(), reference.world().clock());
}
