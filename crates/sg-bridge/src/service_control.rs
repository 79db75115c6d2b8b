//! Control of the host's SSH daemon.
//!
//! The HTTP layer talks to a [`ServiceControl`] so tests can run without a
//! service manager; production uses [`SystemctlServiceControl`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to run {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait ServiceControl: Send + Sync {
    /// Whether the service is currently running.
    async fn is_active(&self) -> Result<bool, ServiceError>;

    /// Start the service. `Ok(false)` means the service manager refused.
    async fn start(&self) -> Result<bool, ServiceError>;

    /// Stop the service. `Ok(false)` means the service manager refused.
    async fn stop(&self) -> Result<bool, ServiceError>;

    /// Established TCP connections to the service's port.
    async fn connections(&self) -> Result<Vec<SshConnection>, ServiceError>;
}

/// One established connection to the SSH daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshConnection {
    pub local: String,
    pub remote: String,
    pub observed_at: DateTime<Utc>,
}

/// Pick established connections whose local port is `port` out of
/// `ss -tn` output. Header and malformed lines are skipped.
pub fn parse_connections(
    ss_output: &str,
    port: u16,
    observed_at: DateTime<Utc>,
) -> Vec<SshConnection> {
    let port = port.to_string();
    ss_output
        .lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            if cols.next()? != "ESTAB" {
                return None;
            }
            let local = cols.nth(2)?;
            let remote = cols.next()?;
            let (_, local_port) = local.rsplit_once(':')?;
            (local_port == port).then(|| SshConnection {
                local: local.to_string(),
                remote: remote.to_string(),
                observed_at,
            })
        })
        .collect()
}

/// Drives a systemd unit through `systemctl` and lists its connections
/// with `ss`.
#[derive(Debug, Clone)]
pub struct SystemctlServiceControl {
    service: String,
    port: u16,
}

impl SystemctlServiceControl {
    pub fn new(service: impl Into<String>, port: u16) -> Self {
        Self {
            service: service.into(),
            port,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    async fn run(program: &str, args: &[&str]) -> Result<std::process::Output, ServiceError> {
        Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ServiceError::Launch {
                program: program.into(),
                source,
            })
    }

    async fn systemctl(&self, verb: &str) -> Result<std::process::Output, ServiceError> {
        debug!(verb, service = %self.service, "running systemctl");
        Self::run("systemctl", &[verb, &self.service]).await
    }

    async fn transition(&self, verb: &str) -> Result<bool, ServiceError> {
        let output = self.systemctl(verb).await?;
        if output.status.success() {
            info!(service = %self.service, verb, "service transition succeeded");
            Ok(true)
        } else {
            warn!(
                service = %self.service,
                verb,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "service transition failed"
            );
            Ok(false)
        }
    }
}

#[async_trait]
impl ServiceControl for SystemctlServiceControl {
    async fn is_active(&self) -> Result<bool, ServiceError> {
        let output = self.systemctl("is-active").await?;
        Ok(output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "active")
    }

    async fn start(&self) -> Result<bool, ServiceError> {
        self.transition("start").await
    }

    async fn stop(&self) -> Result<bool, ServiceError> {
        self.transition("stop").await
    }

    async fn connections(&self) -> Result<Vec<SshConnection>, ServiceError> {
        let output = Self::run("ss", &["-tn"]).await?;
        if !output.status.success() {
            warn!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "ss failed, reporting no connections"
            );
            return Ok(Vec::new());
        }
        Ok(parse_connections(
            &String::from_utf8_lossy(&output.stdout),
            self.port,
            Utc::now(),
        ))
    }
}
