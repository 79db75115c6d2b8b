use tracing_subscriber::{fmt, EnvFilter};

/// Output format for the process-wide subscriber, chosen by
/// `general.log_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// `"json"` (any case) selects JSON lines; every other value falls back
    /// to human-readable output.
    pub fn from_config(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        }
    }
}

/// `RUST_LOG` wins over `general.log_level` so a single run can be turned
/// up (e.g. `sg_session=trace`) without editing the config file.
fn level_filter(configured: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured))
}

/// Install the subscriber the daemon logs through.
///
/// Returns `false` when a subscriber was already installed, in which case
/// the existing one is kept; tests rely on this to initialise freely.
pub fn init(service_name: &str, configured_level: &str, format: LogFormat) -> bool {
    let installed = match format {
        LogFormat::Pretty => init_logging(configured_level),
        LogFormat::Json => init_logging_json(configured_level),
    };
    if installed {
        tracing::info!(
            service = service_name,
            format = format.as_str(),
            level = configured_level,
            "logging ready"
        );
    }
    installed
}

/// Human-readable lines for interactive runs: target, level and source
/// location, no thread ids.
pub fn init_logging(configured_level: &str) -> bool {
    fmt()
        .with_env_filter(level_filter(configured_level))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .is_ok()
}

/// One JSON object per event, for log shippers. Session ids and pids land
/// as structured fields.
pub fn init_logging_json(configured_level: &str) -> bool {
    fmt()
        .json()
        .with_env_filter(level_filter(configured_level))
        .with_current_span(false)
        .with_target(true)
        .try_init()
        .is_ok()
}
