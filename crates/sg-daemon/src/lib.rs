//! Background daemon for shellgate.
//!
//! Owns the session registry for the lifetime of the process, runs the idle
//! reaper, and serves the HTTP API until shutdown.

pub mod daemon;
