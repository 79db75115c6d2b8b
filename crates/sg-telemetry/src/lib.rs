//! Logging setup shared by the shellgate binaries.
//!
//! Human-readable and JSON-formatted output via `tracing-subscriber`, with
//! `RUST_LOG` taking precedence over the configured level.

pub mod logging;
