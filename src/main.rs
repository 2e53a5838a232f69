//! DDNS service.
//!
//! # Architecture Overview
//!
//! ```text
//!   ddns.toml ──▶ config ──▶ Lifecycle::run
//!                               │
//!                               ├─▶ sessions (memory | redis)
//!                               └─▶ web (login / logout / session / status)
//!
//!   ctrl-c ──▶ Lifecycle::stop ──▶ stop hooks (LIFO) ──▶ exit
//! ```

use std::path::PathBuf;

use ddns::app::{register_diagnostics, register_subsystems};
use ddns::config::load_config_or_default;
use ddns::lifecycle::{signals::wait_for_interrupt, Lifecycle};
use ddns::observability::{diagnostics::Diagnostics, logging::init_logging, metrics};

/// Environment variable naming the config file.
const CONFIG_ENV: &str = "DDNS_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "ddns.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    // Static misconfiguration is the only fatal startup error.
    let config = load_config_or_default(&path)?;
    init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ddns starting");
    tracing::info!(
        path = %path.display(),
        from_file = path.exists(),
        session_backend = %config.session.backend,
        enable_web = config.server.enable_web,
        debug = config.server.debug,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        }
    }

    let lifecycle = Lifecycle::from_config(&config.lifecycle, config.stop_order()?);
    let debug = config.server.debug;
    register_subsystems(&lifecycle, config)?;

    let report = lifecycle.run().await?;
    for failure in &report.failed {
        tracing::warn!(hook = %failure.hook, error = %failure.error, "Subsystem not started");
    }

    if debug {
        register_diagnostics(&lifecycle, Diagnostics::default())?;
    }

    wait_for_interrupt().await;

    let stopped = lifecycle.stop().await?;
    tracing::info!(
        completed = stopped.completed.len(),
        failed = stopped.failed.len(),
        "Shutdown complete"
    );
    Ok(())
}
