// src/utils/config.rs
//! Engine configuration
//!
//! Layered with the `config` crate:
//!
//! 1. Built-in defaults (`EngineConfig::default()`)
//! 2. Optional file `config/worldsim.{toml,yaml,json}` (or `$WORLDSIM_CONFIG`)
//! 3. Environment variables, e.g. `WORLDSIM__SCHEDULER__CONCURRENCY=8`

use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub gateway: GatewayConfig,
    pub tick: TickConfig,
    pub universe: UniverseConfig,
    pub storage: StorageConfig,
    pub seed: SeedConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Task scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum tasks in flight at once
    pub concurrency: usize,

    /// Attempts allowed when a task does not set its own limit
    pub default_max_retries: u32,

    /// Base delay before a failed task becomes eligible again (doubles per retry)
    pub retry_backoff_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            default_max_retries: 3,
            retry_backoff_ms: 100,
        }
    }
}

impl SchedulerConfig {
    /// No backoff between retries; used by tests and benchmarks
    pub fn immediate(concurrency: usize) -> Self {
        Self {
            concurrency,
            default_max_retries: 3,
            retry_backoff_ms: 0,
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Generation gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Calls made against one provider before falling back to the next
    pub attempts_per_provider: u32,

    /// First backoff after a provider error
    pub initial_backoff_ms: u64,

    /// Backoff ceiling
    pub max_backoff_ms: u64,

    /// Minimum spacing between two calls on the same binding
    pub min_interval_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            attempts_per_provider: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 10_000,
            min_interval_ms: 0,
        }
    }
}

impl GatewayConfig {
    /// No waiting at all; used by tests
    pub fn immediate() -> Self {
        Self {
            attempts_per_provider: 2,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            min_interval_ms: 0,
        }
    }
}

/// Tick engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Simulated minutes per tick in a world with moderate tension
    pub base_minutes: i64,

    /// Simulated minutes per tick when tension runs high
    pub min_minutes: i64,

    /// Simulated minutes per tick when the world is quiet
    pub max_minutes: i64,

    /// Max active intensity at or above which ticks shorten
    pub high_intensity: f64,

    /// Max active intensity below which ticks lengthen
    pub quiet_intensity: f64,

    /// Wall-clock budget for the generation phase of one tick
    pub tick_timeout_secs: u64,

    pub min_events: usize,
    pub max_events: usize,

    /// Intensity at which a building tension becomes active
    pub activation_threshold: f64,

    /// Intensity at which an active tension reaches climax
    pub climax_threshold: f64,

    /// Whether revelation/betrayal events may pull a resolving tension back to active
    pub allow_reescalation: bool,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            base_minutes: 240,
            min_minutes: 60,
            max_minutes: 1440,
            high_intensity: 0.7,
            quiet_intensity: 0.3,
            tick_timeout_secs: 120,
            min_events: 2,
            max_events: 5,
            activation_threshold: 0.35,
            climax_threshold: 0.8,
            allow_reescalation: true,
        }
    }
}

impl TickConfig {
    pub fn tick_timeout(&self) -> Duration {
        Duration::from_secs(self.tick_timeout_secs)
    }
}

/// Universe-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    /// Ticks to run before the universe is marked complete
    pub target_ticks: u64,

    /// Wall-clock ceiling across all ticks
    pub wall_clock_ceiling_secs: u64,

    /// Failed ticks tolerated in a row before the universe fails
    pub max_consecutive_tick_failures: u32,

    /// Resume this world instead of creating a new one
    pub world_id: Option<String>,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            target_ticks: 30,
            wall_clock_ceiling_secs: 3600,
            max_consecutive_tick_failures: 3,
            world_id: None,
        }
    }
}

impl UniverseConfig {
    pub fn wall_clock_ceiling(&self) -> Duration {
        Duration::from_secs(self.wall_clock_ceiling_secs)
    }
}

/// Persistent store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/worldsim.db"),
        }
    }
}

/// Seed document settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// YAML or JSON seed file
    pub path: PathBuf,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("seed/world.yaml"),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Prometheus exporter settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// e.g. "0.0.0.0:9000"; exporter disabled when unset
    pub listen_addr: Option<String>,
}

impl EngineConfig {
    /// Load configuration from defaults, optional file and environment
    pub fn load() -> Result<Self> {
        let file = std::env::var("WORLDSIM_CONFIG").unwrap_or_else(|_| "config/worldsim".to_string());

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&EngineConfig::default())?)
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                config::Environment::with_prefix("WORLDSIM")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.concurrency == 0 {
            return Err(EngineError::ConfigError(
                "scheduler.concurrency cannot be 0".to_string(),
            ));
        }
        if self.scheduler.default_max_retries == 0 {
            return Err(EngineError::ConfigError(
                "scheduler.default_max_retries must allow at least one attempt".to_string(),
            ));
        }
        if self.gateway.attempts_per_provider == 0 {
            return Err(EngineError::ConfigError(
                "gateway.attempts_per_provider cannot be 0".to_string(),
            ));
        }

        let tick = &self.tick;
        if tick.min_minutes <= 0 {
            return Err(EngineError::ConfigError(
                "tick.min_minutes must be positive".to_string(),
            ));
        }
        if !(tick.min_minutes <= tick.base_minutes && tick.base_minutes <= tick.max_minutes) {
            return Err(EngineError::ConfigError(format!(
                "tick durations must satisfy min <= base <= max (got {} / {} / {})",
                tick.min_minutes, tick.base_minutes, tick.max_minutes
            )));
        }
        for (name, value) in [
            ("tick.high_intensity", tick.high_intensity),
            ("tick.quiet_intensity", tick.quiet_intensity),
            ("tick.activation_threshold", tick.activation_threshold),
            ("tick.climax_threshold", tick.climax_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::ConfigError(format!(
                    "{} must be within [0, 1] (got {})",
                    name, value
                )));
            }
        }
        if tick.quiet_intensity > tick.high_intensity {
            return Err(EngineError::ConfigError(
                "tick.quiet_intensity cannot exceed tick.high_intensity".to_string(),
            ));
        }
        if tick.activation_threshold > tick.climax_threshold {
            return Err(EngineError::ConfigError(
                "tick.activation_threshold cannot exceed tick.climax_threshold".to_string(),
            ));
        }
        if tick.min_events > tick.max_events || tick.max_events == 0 {
            return Err(EngineError::ConfigError(format!(
                "tick event bounds are invalid (min {}, max {})",
                tick.min_events, tick.max_events
            )));
        }
        if self.universe.wall_clock_ceiling_secs == 0 {
            return Err(EngineError::ConfigError(
                "universe.wall_clock_ceiling_secs cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}
