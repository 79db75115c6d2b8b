use thiserror::Error;

use crate::adapter::AdapterError;
use crate::session::SessionId;

/// Errors reported by [`SessionRegistry`](crate::SessionRegistry) operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The registry already holds the configured maximum of sessions.
    #[error("session limit reached ({max})")]
    Capacity { max: usize },

    /// Unknown id, or a session that has already been reclaimed.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The session's shell has exited or its channel failed.
    #[error("session {0} is no longer active")]
    Dead(SessionId),

    #[error("failed to launch shell: {0}")]
    Spawn(#[source] AdapterError),

    /// I/O failure on a live channel; the session is now dead.
    #[error("channel failure on session {id}: {source}")]
    Channel {
        id: SessionId,
        #[source]
        source: AdapterError,
    },

    #[error("invalid terminal size {rows}x{cols}")]
    InvalidDimensions { rows: u16, cols: u16 },

    #[error("session registry is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, SessionError>;
