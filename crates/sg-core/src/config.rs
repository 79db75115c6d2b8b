use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.shellgate/config.toml`.
///
/// Every section and field carries a serde default, so a partial file only
/// needs to name the values it overrides.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub ssh: SshConfig,
}

impl Config {
    /// Load config from `~/.shellgate/config.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.general.validate()?;
        self.sessions.validate()?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".shellgate")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `"pretty"` or `"json"`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl GeneralConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.log_format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "general.log_format must be \"pretty\" or \"json\", got {other:?}"
            ))),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}

/// Which shell channel the session registry spawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Pseudo-terminal when the host can open one, piped subprocess otherwise.
    #[default]
    Auto,
    Pty,
    Piped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_rows")]
    pub default_rows: u16,
    #[serde(default = "default_cols")]
    pub default_cols: u16,
    /// Retained output per session, in bytes.
    #[serde(default = "default_output_buffer_bytes")]
    pub output_buffer_bytes: usize,
    /// Retained history lines per session.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,
    #[serde(default)]
    pub backend: BackendKind,
    /// Explicit shell executable; resolved from the environment when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    #[serde(default = "default_term")]
    pub term: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            default_rows: default_rows(),
            default_cols: default_cols(),
            output_buffer_bytes: default_output_buffer_bytes(),
            history_limit: default_history_limit(),
            terminate_grace_ms: default_terminate_grace_ms(),
            backend: BackendKind::default(),
            shell: None,
            term: default_term(),
        }
    }
}

impl SessionsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.max_sessions == 0, "sessions.max_sessions must be at least 1"),
            (self.sweep_interval_secs == 0, "sessions.sweep_interval_secs must be at least 1"),
            (self.default_rows == 0, "sessions.default_rows must be at least 1"),
            (self.default_cols == 0, "sessions.default_cols must be at least 1"),
            (self.output_buffer_bytes == 0, "sessions.output_buffer_bytes must be at least 1"),
            (self.history_limit == 0, "sessions.history_limit must be at least 1"),
        ];
        for (failed, msg) in checks {
            if failed {
                return Err(ConfigError::Validation(msg.to_string()));
            }
        }
        Ok(())
    }
}

fn default_max_sessions() -> usize {
    5
}
fn default_idle_timeout_secs() -> u64 {
    1800
}
fn default_sweep_interval_secs() -> u64 {
    30
}
fn default_rows() -> u16 {
    24
}
fn default_cols() -> u16 {
    80
}
fn default_output_buffer_bytes() -> usize {
    1024 * 1024
}
fn default_history_limit() -> usize {
    500
}
fn default_terminate_grace_ms() -> u64 {
    2000
}
fn default_term() -> String {
    "xterm-256color".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8022
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// systemd unit controlled by the dashboard's start/stop buttons.
    #[serde(default = "default_ssh_service")]
    pub service_name: String,

    /// Port the SSH daemon listens on; established TCP connections to it
    /// are reported as SSH connections.
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            service_name: default_ssh_service(),
            port: default_ssh_port(),
        }
    }
}

fn default_ssh_service() -> String {
    "ssh".into()
}
fn default_ssh_port() -> u16 {
    22
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses_snake_case() {
        let cfg: Config = toml::from_str("[sessions]\nbackend = \"piped\"\n").unwrap();
        assert_eq!(cfg.sessions.backend, BackendKind::Piped);
    }

    #[test]
    fn unknown_backend_is_a_parse_error() {
        let result: Result<Config, _> = toml::from_str("[sessions]\nbackend = \"telnet\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn zero_max_sessions_fails_validation() {
        let mut cfg = Config::default();
        cfg.sessions.max_sessions = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_sessions"));
    }

    #[test]
    fn unknown_log_format_fails_validation() {
        let mut cfg = Config::default();
        cfg.general.log_format = "xml".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }
}
