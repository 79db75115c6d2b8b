//! Terminal-session broker for shellgate.
//!
//! Spawns one interactive shell per client, bridges its input and output
//! across a poll-based request/response surface, and reclaims sessions that
//! die or go idle.
//!
//! Key components:
//! - [`shell`]: locating a launchable shell executable
//! - [`adapter`]: one child shell plus its channel (pseudo-terminal, or a
//!   line-buffered piped subprocess where no PTY is available)
//! - [`buffer`] / [`history`]: bounded per-session output and command history
//! - [`session`]: a single client's terminal and its state machine
//! - [`registry`]: capacity-limited session collection and the idle reaper

pub mod adapter;
pub mod buffer;
pub mod error;
pub mod history;
mod piped_channel;
mod pty_channel;
pub mod registry;
pub mod session;
pub mod shell;

pub use adapter::{AdapterError, ChannelKind, ShellAdapter, SpawnOptions, Termination};
pub use error::SessionError;
pub use registry::{ReapReport, RegistrySettings, SessionRegistry};
pub use session::{SessionId, SessionState, SessionSummary};
pub use shell::{ShellCommand, ShellResolver, SystemShellResolver};
