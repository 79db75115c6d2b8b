//! shellgate daemon: serves remote shell sessions over a poll-based HTTP API.

use anyhow::{Context, Result};
use sg_core::config::Config;
use sg_daemon::daemon::Daemon;
use sg_telemetry::logging::{self, LogFormat};
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// `SHELLGATE_CONFIG` names an explicit file; otherwise the default path is
/// used, with built-in defaults when it does not exist.
fn load_config() -> Result<Config> {
    match std::env::var_os("SHELLGATE_CONFIG") {
        Some(path) => Config::load_from(&path)
            .with_context(|| format!("failed to load config from {}", path.to_string_lossy())),
        None => Config::load().context("failed to load config"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    logging::init(
        "shellgate",
        &config.general.log_level,
        LogFormat::from_config(&config.general.log_format),
    );
    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "shellgate daemon starting"
    );

    let daemon = Daemon::new(config)?;
    let shutdown = daemon.shutdown_handle();

    // Wire ctrl-c to trigger graceful shutdown.
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, initiating shutdown");
        shutdown.trigger();
    });

    daemon.run().await
}
