// src/observability/mod.rs
//! Tracing and metrics initialization

use crate::utils::config::LoggingConfig;
use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level when it is set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| EngineError::ConfigError(format!("Invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| EngineError::ConfigError(format!("Failed to install subscriber: {}", e)))
}

/// Install the Prometheus recorder, serving `/metrics` on `listen_addr`
///
/// Without an address the `metrics` macros stay no-ops.
pub fn init_metrics(listen_addr: Option<&str>) -> Result<()> {
    let Some(addr) = listen_addr else {
        return Ok(());
    };

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| EngineError::ConfigError(format!("Invalid metrics address '{}': {}", addr, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| EngineError::ConfigError(format!("Failed to install metrics exporter: {}", e)))?;

    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}
