// src/engine/universe.rs
//! Universe runner
//!
//! Owns one world for its whole life: opens it (resume or seed), drives the
//! tick engine until the target tick, checkpoints after every tick and
//! archives the world as `complete` or `failed`.
//!
//! ```text
//!   open ──▶ [ advance ─▶ save ]* ──▶ complete
//!                 │          │
//!                 │          └─ store error ──────────▶ failed
//!                 ├─ N consecutive tick failures ─────▶ failed
//!                 └─ wall-clock ceiling ──────────────▶ failed
//! ```

use crate::engine::progress::{Phase, ProgressHandle, ProgressReporter};
use crate::engine::tick_engine::{TickEngine, TickOptions, TickResult};
use crate::store::WorldStore;
use crate::utils::config::UniverseConfig;
use crate::utils::errors::{EngineError, Result};
use crate::world::ids::WorldId;
use crate::world::seed::SeedProvider;
use crate::world::state::{UniverseStatus, WorldState};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How a call to `run` ended
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: UniverseStatus,
    pub final_tick: u64,
    pub ticks_advanced: u64,

    /// Stopped by the cancellation token; the last checkpoint is kept
    pub interrupted: bool,
}

pub struct Universe {
    world: WorldState,
    engine: TickEngine,
    store: Arc<dyn WorldStore>,
    progress: ProgressReporter,
    config: UniverseConfig,
}

impl Universe {
    /// Resume the configured world from `store`, or build it from the seed
    ///
    /// A freshly seeded world is checkpointed at tick 0 before returning.
    pub async fn open(
        config: UniverseConfig,
        mut engine: TickEngine,
        store: Arc<dyn WorldStore>,
        seed: &dyn SeedProvider,
    ) -> Result<Self> {
        let existing = match &config.world_id {
            Some(id) => store.load_world(&WorldId::new(id.as_str())).await?,
            None => None,
        };

        let world = match existing {
            Some(world) => {
                info!(
                    "Resuming world {} ({}) at tick {}",
                    world.id(),
                    world.name(),
                    world.tick()
                );
                world
            }
            None => {
                let id = config
                    .world_id
                    .as_deref()
                    .map_or_else(WorldId::generate, WorldId::from);
                let world = WorldState::from_seed(id, seed.load_seed().await?)?;
                store.save_world(&world).await?;
                info!("Seeded world {} ({})", world.id(), world.name());
                world
            }
        };

        let progress = ProgressReporter::new(world.tick(), config.target_ticks);
        match world.status() {
            UniverseStatus::Active => {}
            UniverseStatus::Complete => progress.set_status("complete", Phase::Complete),
            UniverseStatus::Failed { .. } => progress.set_status("failed", Phase::Failed),
        }
        engine.set_progress(progress.clone());

        Ok(Self {
            world,
            engine,
            store,
            progress,
            config,
        })
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn into_world(self) -> WorldState {
        self.world
    }

    pub fn engine(&self) -> &TickEngine {
        &self.engine
    }

    pub fn progress(&self) -> ProgressHandle {
        self.progress.handle()
    }

    fn outcome(&self, ticks_advanced: u64, interrupted: bool) -> RunOutcome {
        RunOutcome {
            status: self.world.status().clone(),
            final_tick: self.world.tick(),
            ticks_advanced,
            interrupted,
        }
    }

    /// Advance and checkpoint a single tick
    pub async fn step(&mut self, options: TickOptions) -> Result<TickResult> {
        let result = self.engine.advance(&mut self.world, options).await?;
        self.checkpoint().await?;
        Ok(result)
    }

    async fn checkpoint(&mut self) -> Result<()> {
        self.progress.set_phase(Phase::Saving);
        self.store.save_world(&self.world).await?;
        self.progress.set_phase(Phase::Idle);
        Ok(())
    }

    /// Run until the target tick, a universe-level fault, or `cancel`
    ///
    /// Universe-level faults archive the world as failed and are returned as
    /// errors. Cancellation drops the tick in flight; the world stays at its
    /// last committed (and saved) tick.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<RunOutcome> {
        if self.world.status().is_terminal() {
            info!(
                "World {} is already {}",
                self.world.id(),
                self.world.status().as_str()
            );
            return Ok(self.outcome(0, false));
        }

        let ceiling = self.config.wall_clock_ceiling();
        let deadline = Instant::now() + ceiling;
        let mut advanced = 0;
        let mut consecutive_failures = 0;

        info!(
            "Running world {} from tick {} to {}",
            self.world.id(),
            self.world.tick(),
            self.config.target_ticks
        );

        while self.world.tick() < self.config.target_ticks {
            if Instant::now() >= deadline {
                return self.fail(EngineError::WallClockExceeded(ceiling)).await;
            }

            let options = TickOptions::default().with_deadline(deadline);
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                step = self.engine.advance(&mut self.world, options) => Some(step),
            };
            let Some(step) = step else {
                info!("Run interrupted at tick {}", self.world.tick());
                self.progress.set_phase(Phase::Idle);
                return Ok(self.outcome(advanced, true));
            };

            match step {
                Ok(_) => {
                    consecutive_failures = 0;
                    advanced += 1;
                    if let Err(e) = self.checkpoint().await {
                        return self.fail(e).await;
                    }
                }
                Err(e) if e.is_universe_fatal() => return self.fail(e).await,
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        "Tick {} failed ({}/{}): {}",
                        self.world.next_tick(),
                        consecutive_failures,
                        self.config.max_consecutive_tick_failures,
                        e
                    );
                    if consecutive_failures >= self.config.max_consecutive_tick_failures {
                        let reason = format!(
                            "{} consecutive tick failures, last: {}",
                            consecutive_failures, e
                        );
                        return self.fail(EngineError::UniverseFailed(reason)).await;
                    }
                }
            }
        }

        self.world.mark_complete();
        if let Err(e) = self.store.save_world(&self.world).await {
            error!("Failed to archive completed world {}: {}", self.world.id(), e);
            return Err(e);
        }
        self.progress.set_status("complete", Phase::Complete);
        metrics::counter!("worldsim_universes_finished_total", "status" => "complete").increment(1);
        info!(
            "World {} complete at tick {}",
            self.world.id(),
            self.world.tick()
        );

        Ok(self.outcome(advanced, false))
    }

    /// Archive the world as failed and hand the fault back to the caller
    async fn fail(&mut self, fault: EngineError) -> Result<RunOutcome> {
        error!("World {} failed: {}", self.world.id(), fault);
        self.world.mark_failed(fault.to_string());

        if let Err(e) = self.store.save_world(&self.world).await {
            warn!("Could not persist failed status of {}: {}", self.world.id(), e);
        }
        self.progress.set_status("failed", Phase::Failed);
        metrics::counter!("worldsim_universes_finished_total", "status" => "failed").increment(1);

        Err(fault)
    }
}
