use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use chrono::Utc;
use sg_core::config::{BackendKind, SessionsConfig};
use sg_core::shutdown::ShutdownSignal;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::adapter::{ShellAdapter, SpawnOptions, Termination};
use crate::error::{Result, SessionError};
use crate::session::{Session, SessionId, SessionState, SessionSummary};
use crate::shell::ShellResolver;

type SessionHandle = Arc<Mutex<Session>>;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Registry tunables, derived from the `[sessions]` config section.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub max_sessions: usize,
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
    pub default_rows: u16,
    pub default_cols: u16,
    pub output_buffer_bytes: usize,
    pub history_limit: usize,
    pub terminate_grace: Duration,
    pub backend: BackendKind,
}

impl From<&SessionsConfig> for RegistrySettings {
    fn from(cfg: &SessionsConfig) -> Self {
        Self {
            max_sessions: cfg.max_sessions,
            idle_timeout: Duration::from_secs(cfg.idle_timeout_secs),
            sweep_interval: Duration::from_secs(cfg.sweep_interval_secs),
            default_rows: cfg.default_rows,
            default_cols: cfg.default_cols,
            output_buffer_bytes: cfg.output_buffer_bytes,
            history_limit: cfg.history_limit,
            terminate_grace: Duration::from_millis(cfg.terminate_grace_ms),
            backend: cfg.backend,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::from(&SessionsConfig::default())
    }
}

/// Outcome of one idle/dead sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Sessions closed for exceeding the idle timeout.
    pub idle: usize,
    /// Sessions closed because their shell had died.
    pub dead: usize,
    /// Closed sessions whose process exit could not be confirmed.
    pub unconfirmed: usize,
}

impl ReapReport {
    pub fn total(&self) -> usize {
        self.idle + self.dead
    }
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Slots {
    sessions: HashMap<SessionId, SessionHandle>,
    /// Creations that passed the capacity check but are still spawning.
    pending: usize,
    shutting_down: bool,
}

/// Capacity-limited collection of live sessions.
///
/// Lock order is session before registry: the registry-wide lock guards only
/// the id map and is never held while a session lock is being acquired, so
/// work on one session never stalls another.
pub struct SessionRegistry {
    settings: RegistrySettings,
    resolver: Arc<dyn ShellResolver>,
    slots: Mutex<Slots>,
}

impl SessionRegistry {
    pub fn new(settings: RegistrySettings, resolver: Arc<dyn ShellResolver>) -> Self {
        info!(
            max_sessions = settings.max_sessions,
            idle_timeout_secs = settings.idle_timeout.as_secs(),
            backend = ?settings.backend,
            "creating SessionRegistry"
        );
        Self {
            settings,
            resolver,
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    fn lock_slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| {
            warn!("registry lock was poisoned, recovering");
            e.into_inner()
        })
    }

    fn handle(&self, id: SessionId) -> Result<SessionHandle> {
        self.lock_slots()
            .sessions
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    /// Run `f` with exclusive access to one session. The registry lock is
    /// released before the session lock is taken.
    fn with_session<T>(&self, id: SessionId, f: impl FnOnce(&mut Session) -> T) -> Result<T> {
        let handle = self.handle(id)?;
        let mut session = lock_session(&handle);
        if session.state() == SessionState::Closed {
            return Err(SessionError::NotFound(id));
        }
        Ok(f(&mut session))
    }

    /// Number of sessions currently held, in any state.
    pub fn len(&self) -> usize {
        self.lock_slots().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- operations ---------------------------------------------------------

    /// Spawn a shell and register a new `Active` session.
    ///
    /// The capacity check reserves a slot atomically; the shell itself is
    /// spawned outside the registry lock so a slow spawn never blocks other
    /// sessions.
    pub fn create(&self) -> Result<SessionId> {
        let reservation = self.reserve()?;

        let opts = SpawnOptions {
            backend: self.settings.backend,
            rows: self.settings.default_rows,
            cols: self.settings.default_cols,
            grace: self.settings.terminate_grace,
        };
        let adapter = ShellAdapter::spawn(self.resolver.as_ref(), &opts).map_err(|e| {
            warn!(error = %e, "shell spawn failed");
            SessionError::Spawn(e)
        })?;

        let mut session = Session::new(
            adapter,
            opts.rows,
            opts.cols,
            self.settings.output_buffer_bytes,
            self.settings.history_limit,
        );
        let id = session.id();

        let mut slots = self.lock_slots();
        reservation.commit(&mut slots);
        if slots.shutting_down {
            drop(slots);
            session.close();
            return Err(SessionError::ShuttingDown);
        }
        slots
            .sessions
            .insert(id, Arc::new(Mutex::new(session)));
        let active = slots.sessions.len();
        drop(slots);

        info!(session_id = %id, active, "session created");
        Ok(id)
    }

    fn reserve(&self) -> Result<Reservation<'_>> {
        let mut slots = self.lock_slots();
        if slots.shutting_down {
            return Err(SessionError::ShuttingDown);
        }
        if slots.sessions.len() + slots.pending >= self.settings.max_sessions {
            debug!(max = self.settings.max_sessions, "session limit reached");
            return Err(SessionError::Capacity {
                max: self.settings.max_sessions,
            });
        }
        slots.pending += 1;
        Ok(Reservation {
            registry: self,
            held: true,
        })
    }

    /// Forward input bytes to a session's shell.
    pub fn submit_input(&self, id: SessionId, data: &[u8]) -> Result<()> {
        self.with_session(id, |s| s.submit(data))?
    }

    /// Bytes produced since the previous call for this session. Never blocks;
    /// returns an empty vector when nothing new has arrived.
    pub fn read_output(&self, id: SessionId) -> Result<Vec<u8>> {
        self.with_session(id, |s| s.read())
    }

    /// Like [`read_output`](Self::read_output), also reporting the state
    /// observed by the same drain.
    pub fn poll_output(&self, id: SessionId) -> Result<(Vec<u8>, SessionState)> {
        self.with_session(id, |s| {
            let bytes = s.read();
            (bytes, s.state())
        })
    }

    /// Change a session's screen size. Rejects zero dimensions without
    /// touching the session.
    pub fn resize(&self, id: SessionId, rows: u16, cols: u16) -> Result<()> {
        if rows == 0 || cols == 0 {
            return Err(SessionError::InvalidDimensions { rows, cols });
        }
        self.with_session(id, |s| s.resize(rows, cols))?
    }

    pub fn get_history(&self, id: SessionId) -> Result<Vec<String>> {
        self.with_session(id, |s| s.history())
    }

    /// Observe liveness now and report the resulting state.
    pub fn check(&self, id: SessionId) -> Result<SessionState> {
        self.with_session(id, |s| s.refresh_state())
    }

    pub fn summary(&self, id: SessionId) -> Result<SessionSummary> {
        self.with_session(id, |s| {
            s.refresh_state();
            s.summary()
        })
    }

    /// The retained output window. Does not advance the delivery cursor or
    /// count as activity.
    pub fn scrollback(&self, id: SessionId) -> Result<Vec<u8>> {
        self.with_session(id, |s| s.scrollback())
    }

    /// Terminate a session and drop it from the registry.
    ///
    /// Returns `true` if this call removed the session, `false` if it was
    /// already gone. Either way the caller gets no error, so duplicate closes
    /// and closes racing the reaper are harmless.
    pub fn close(&self, id: SessionId) -> bool {
        let removed = self.lock_slots().sessions.remove(&id);
        match removed {
            Some(handle) => {
                let outcome = lock_session(&handle).close();
                if outcome == Termination::Unconfirmed {
                    warn!(session_id = %id, "session closed but shell exit was not confirmed");
                }
                true
            }
            None => {
                debug!(session_id = %id, "close on unknown session ignored");
                false
            }
        }
    }

    /// Snapshot of every session. The registry lock is held only for the
    /// copy of the id map.
    pub fn list(&self) -> Vec<SessionSummary> {
        let handles: Vec<SessionHandle> = self.lock_slots().sessions.values().cloned().collect();
        let mut out: Vec<SessionSummary> = handles
            .iter()
            .map(|handle| {
                let mut session = lock_session(handle);
                session.refresh_state();
                session.summary()
            })
            .filter(|summary| summary.state != SessionState::Closed)
            .collect();
        out.sort_by_key(|s| s.created_at);
        out
    }

    // -- reclamation --------------------------------------------------------

    /// Close every session that is dead or idle past the timeout.
    ///
    /// Sessions busy with another caller are skipped until the next sweep;
    /// a session in use is not idle.
    pub fn reap(&self) -> ReapReport {
        let handles: Vec<(SessionId, SessionHandle)> = self
            .lock_slots()
            .sessions
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect();

        let now = Utc::now();
        let mut report = ReapReport::default();

        for (id, handle) in handles {
            let mut session = match handle.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => continue,
                Err(TryLockError::Poisoned(e)) => {
                    warn!(session_id = %id, "session lock was poisoned, recovering");
                    e.into_inner()
                }
            };

            let state = session.refresh_state();
            let idle_for = session.idle_for(now);
            let dead = match state {
                SessionState::Closed => continue,
                SessionState::Dead => true,
                SessionState::Active if idle_for > self.settings.idle_timeout => false,
                SessionState::Active => continue,
            };

            // Removal under the session lock, so a concurrent close() either
            // already removed it (we skip) or will find it gone.
            let removed = {
                let mut slots = self.lock_slots();
                match slots.sessions.get(&id) {
                    Some(current) if Arc::ptr_eq(current, &handle) => {
                        slots.sessions.remove(&id);
                        true
                    }
                    _ => false,
                }
            };
            if !removed {
                continue;
            }

            let reason = if dead { "dead" } else { "idle" };
            info!(session_id = %id, reason, idle_secs = idle_for.as_secs(), "reaping session");
            if session.close() == Termination::Unconfirmed {
                warn!(session_id = %id, "reaped session's shell did not confirm exit");
                report.unconfirmed += 1;
            }
            if dead {
                report.dead += 1;
            } else {
                report.idle += 1;
            }
        }

        report
    }

    /// Run [`reap`](Self::reap) every `sweep_interval` until `shutdown` fires.
    pub fn spawn_reaper(self: &Arc<Self>, shutdown: &ShutdownSignal) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = self.settings.sweep_interval;
        let mut shutdown_rx = shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Consume the first immediate tick.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.wait() => {
                        info!("session reaper stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        let sweep = Arc::clone(&registry);
                        match tokio::task::spawn_blocking(move || sweep.reap()).await {
                            Ok(report) if report.total() > 0 => info!(
                                idle = report.idle,
                                dead = report.dead,
                                unconfirmed = report.unconfirmed,
                                "reap completed"
                            ),
                            Ok(_) => debug!("reap found nothing to reclaim"),
                            Err(e) => error!(error = %e, "reap task failed"),
                        }
                    }
                }
            }
        })
    }

    /// Close every session and refuse further creations. Blocks until each
    /// shell has been terminated.
    pub fn shutdown(&self) {
        let drained: Vec<(SessionId, SessionHandle)> = {
            let mut slots = self.lock_slots();
            slots.shutting_down = true;
            slots.sessions.drain().collect()
        };
        let count = drained.len();
        for (id, handle) in drained {
            if lock_session(&handle).close() == Termination::Unconfirmed {
                warn!(session_id = %id, "shell exit not confirmed during shutdown");
            }
        }
        info!(closed = count, "session registry shut down");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock_slots().shutting_down
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("max_sessions", &self.settings.max_sessions)
            .field("active_count", &self.len())
            .finish()
    }
}

fn lock_session(handle: &SessionHandle) -> MutexGuard<'_, Session> {
    handle.lock().unwrap_or_else(|e| {
        warn!("session lock was poisoned, recovering");
        e.into_inner()
    })
}

/// A capacity slot claimed by an in-flight `create`. Released on drop unless
/// committed.
struct Reservation<'a> {
    registry: &'a SessionRegistry,
    held: bool,
}

impl Reservation<'_> {
    fn commit(mut self, slots: &mut Slots) {
        slots.pending = slots.pending.saturating_sub(1);
        self.held = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.held {
            let mut slots = self.registry.lock_slots();
            slots.pending = slots.pending.saturating_sub(1);
        }
    }
}
