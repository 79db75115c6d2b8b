use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::{ChannelKind, ShellAdapter, Termination};
use crate::buffer::OutputBuffer;
use crate::error::{Result, SessionError};
use crate::history::{History, LineAssembler};

pub type SessionId = Uuid;

/// Lifecycle of a session. Transitions only move forward:
/// `Active -> Dead -> Closed` or `Active -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    /// The shell exited or its channel failed; waiting to be reclaimed.
    Dead,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Active => "active",
            SessionState::Dead => "dead",
            SessionState::Closed => "closed",
        }
    }
}

/// Point-in-time view of a session for listings and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub rows: u16,
    pub cols: u16,
    pub backend: ChannelKind,
    pub history_len: usize,
}

/// One client's terminal: the shell adapter plus everything the registry
/// tracks about it.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    state: SessionState,
    rows: u16,
    cols: u16,
    adapter: ShellAdapter,
    output: OutputBuffer,
    history: History,
    line: LineAssembler,
}

impl Session {
    pub(crate) fn new(
        adapter: ShellAdapter,
        rows: u16,
        cols: u16,
        output_capacity: usize,
        history_limit: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_activity_at: now,
            state: SessionState::Active,
            rows,
            cols,
            adapter,
            output: OutputBuffer::new(output_capacity),
            history: History::new(history_limit),
            line: LineAssembler::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    /// Demote `Active` to `Dead` if the shell is gone. Returns the current state.
    pub(crate) fn refresh_state(&mut self) -> SessionState {
        if self.state == SessionState::Active && !self.adapter.is_alive() {
            info!(session_id = %self.id, exit_code = ?self.adapter.exit_code(), "session shell exited");
            self.state = SessionState::Dead;
        }
        self.state
    }

    fn ensure_active(&mut self) -> Result<()> {
        match self.refresh_state() {
            SessionState::Active => Ok(()),
            _ => Err(SessionError::Dead(self.id)),
        }
    }

    fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    /// Forward raw input to the shell and record any completed command lines.
    pub(crate) fn submit(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_active()?;
        if let Err(source) = self.adapter.write(data) {
            warn!(session_id = %self.id, error = %source, "input write failed, marking session dead");
            self.state = SessionState::Dead;
            return Err(SessionError::Channel {
                id: self.id,
                source,
            });
        }
        self.touch();
        for line in self.line.feed(data) {
            self.history.push(line);
        }
        Ok(())
    }

    /// Pull whatever the shell produced and return the bytes not yet delivered.
    ///
    /// A dead session still hands out output queued before its shell exited.
    pub(crate) fn read(&mut self) -> Vec<u8> {
        if self.state != SessionState::Closed {
            let fresh = self.adapter.drain_available();
            self.output.push(&fresh);
        }
        let unread = self.output.take_unread();
        self.touch();
        self.refresh_state();
        unread
    }

    pub(crate) fn resize(&mut self, rows: u16, cols: u16) -> Result<()> {
        if rows == 0 || cols == 0 {
            return Err(SessionError::InvalidDimensions { rows, cols });
        }
        self.ensure_active()?;
        self.adapter
            .resize(rows, cols)
            .map_err(|source| SessionError::Channel {
                id: self.id,
                source,
            })?;
        self.rows = rows;
        self.cols = cols;
        debug!(session_id = %self.id, rows, cols, "session resized");
        Ok(())
    }

    pub fn history(&self) -> Vec<String> {
        self.history.entries()
    }

    /// The retained output window, including bytes already delivered.
    /// Pulls pending output first so the window is current.
    pub(crate) fn scrollback(&mut self) -> Vec<u8> {
        if self.state != SessionState::Closed {
            let fresh = self.adapter.drain_available();
            self.output.push(&fresh);
        }
        self.output.retained()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            state: self.state,
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
            rows: self.rows,
            cols: self.cols,
            backend: self.adapter.kind(),
            history_len: self.history.len(),
        }
    }

    /// Time since the last input or output poll, as of `now`.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_activity_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Terminate the shell and mark the session closed.
    pub(crate) fn close(&mut self) -> Termination {
        self.state = SessionState::Closed;
        let outcome = self.adapter.terminate();
        info!(session_id = %self.id, ?outcome, "session closed");
        outcome
    }
}
