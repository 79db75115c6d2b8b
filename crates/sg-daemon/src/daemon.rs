use std::sync::Arc;

use anyhow::{Context, Result};
use sg_bridge::{api_router, AppState, ServiceControl, SystemctlServiceControl};
use sg_core::config::Config;
use sg_core::shutdown::ShutdownSignal;
use sg_session::{RegistrySettings, SessionRegistry, SystemShellResolver};
use tokio::net::TcpListener;
use tracing::{error, info};

/// The shellgate daemon.
///
/// Holds the session registry, the idle reaper and the API server. Shuts
/// down when the `ShutdownSignal` is triggered (e.g. via ctrl-c), and never
/// returns while a child shell it spawned is still running.
pub struct Daemon {
    config: Config,
    registry: Arc<SessionRegistry>,
    ssh: Arc<dyn ServiceControl>,
    shutdown: ShutdownSignal,
}

impl Daemon {
    /// Create a daemon that controls the SSH service through systemctl.
    pub fn new(config: Config) -> Result<Self> {
        let ssh = Arc::new(SystemctlServiceControl::new(
            config.ssh.service_name.clone(),
            config.ssh.port,
        ));
        Self::with_service_control(config, ssh)
    }

    pub fn with_service_control(config: Config, ssh: Arc<dyn ServiceControl>) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let resolver = Arc::new(SystemShellResolver::new(
            config.sessions.shell.clone(),
            config.sessions.term.clone(),
        ));
        let registry = Arc::new(SessionRegistry::new(
            RegistrySettings::from(&config.sessions),
            resolver,
        ));
        Ok(Self {
            config,
            registry,
            ssh,
            shutdown: ShutdownSignal::new(),
        })
    }

    /// Returns a handle that can be used to trigger shutdown from another task.
    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Send the shutdown signal.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind `daemon.host:daemon.port` and serve until shutdown.
    pub async fn run(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.daemon.host, self.config.daemon.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind API listener on {addr}"))?;
        self.serve(listener).await
    }

    /// Serve the API on an already-bound listener until shutdown, then close
    /// every session.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let reaper = self.registry.spawn_reaper(&self.shutdown);

        let state = Arc::new(AppState::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.ssh),
        ));
        let router = api_router(state);
        let local = listener.local_addr().context("listener has no local address")?;
        info!(addr = %local, "API server listening");

        let mut shutdown_rx = self.shutdown.subscribe();
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown_rx.wait().await })
            .await;

        // The server can also stop on its own; make sure the reaper follows.
        if !self.shutdown.is_shutting_down() {
            self.shutdown.trigger();
        }
        if let Err(e) = reaper.await {
            error!(error = %e, "session reaper task failed");
        }

        let registry = Arc::clone(&self.registry);
        tokio::task::spawn_blocking(move || registry.shutdown())
            .await
            .context("registry shutdown task failed")?;
        info!("daemon stopped");

        served.context("API server error")
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("registry", &self.registry)
            .field("shutting_down", &self.shutdown.is_shutting_down())
            .finish_non_exhaustive()
    }
}
