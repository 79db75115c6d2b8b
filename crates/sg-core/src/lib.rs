//! Shared foundations for the shellgate services.
//!
//! - [`config`]: TOML configuration with per-field defaults and validation
//! - [`shutdown`]: broadcast-based cooperative shutdown coordination

pub mod config;
pub mod shutdown;
