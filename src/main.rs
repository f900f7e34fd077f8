// src/main.rs
//! Worldsim Engine
//!
//! Seeds (or resumes) one world and runs it to completion, checkpointing
//! every tick to SQLite. Pass a path to also export the generated mail
//! (`.mbox` or JSON) when the run ends.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use worldsim_engine::engine::{HeuristicPlanner, TickEngine, Universe};
use worldsim_engine::export::{ExportFormat, Exporter};
use worldsim_engine::gateway::{PersonaGateway, TemplateProvider};
use worldsim_engine::observability::{init_metrics, init_tracing};
use worldsim_engine::scheduler::TaskScheduler;
use worldsim_engine::store::SqliteWorldStore;
use worldsim_engine::utils::config::EngineConfig;
use worldsim_engine::world::SeedFile;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = EngineConfig::load().context("loading configuration")?;
    config.validate()?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.logging)?;
    init_metrics(config.metrics.listen_addr.as_deref())?;

    info!("Starting Worldsim Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {:?}", config);

    let export_path = std::env::args().nth(1).map(PathBuf::from);

    let store = Arc::new(
        SqliteWorldStore::open(&config.storage.path)
            .await
            .with_context(|| format!("opening store {}", config.storage.path.display()))?,
    );

    let gateway = Arc::new(
        PersonaGateway::new(config.gateway.clone()).with_provider(Arc::new(TemplateProvider::new())),
    );
    let engine = TickEngine::new(
        config.tick.clone(),
        TaskScheduler::new(config.scheduler.clone()),
        gateway.clone(),
        Arc::new(HeuristicPlanner::new()),
    )?;

    let seed = SeedFile::new(&config.seed.path);
    let mut universe = Universe::open(config.universe.clone(), engine, store, &seed)
        .await
        .with_context(|| format!("opening world from {}", config.seed.path.display()))?;

    // Bindings are resolved once for the life of the universe
    let bound = gateway.bind_world(universe.world())?;
    info!("Bound {} personas for world {}", bound, universe.world().id());

    // Graceful shutdown handler
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal, stopping after the last checkpoint...");
                shutdown.cancel();
            }
            Err(e) => warn!("Failed to install CTRL+C handler: {}", e),
        }
    });

    let run = universe.run(cancel).await;

    if let Some(path) = &export_path {
        Exporter::new(ExportFormat::from_path(path))
            .export_to(universe.world(), path)
            .await?;
        info!("Exported {} artifacts to {}", universe.world().artifacts().len(), path.display());
    }

    match run {
        Ok(outcome) => {
            info!(
                "World {} stopped at tick {} ({}){}",
                universe.world().id(),
                outcome.final_tick,
                outcome.status.as_str(),
                if outcome.interrupted { ", interrupted" } else { "" }
            );
            Ok(())
        }
        Err(e) => {
            error!("World {} failed: {}", universe.world().id(), e);
            Err(e.into())
        }
    }
}
