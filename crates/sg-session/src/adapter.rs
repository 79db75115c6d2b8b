use std::io::{Read, Write};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use flume::TryRecvError;
use serde::{Deserialize, Serialize};
use sg_core::config::BackendKind;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::piped_channel::PipedChannel;
use crate::pty_channel::PtyChannel;
use crate::shell::ShellResolver;

/// Chunks buffered between the reader thread and the next drain.
const OUTPUT_QUEUE_CHUNKS: usize = 256;
const READ_CHUNK: usize = 4096;
const EXIT_POLL: Duration = Duration::from_millis(25);
/// How long to wait for the kernel to reap a child after a forced kill.
const KILL_CONFIRM: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("no usable shell found (tried: {0})")]
    ShellNotFound(String),

    /// The host cannot open a pseudo-terminal.
    #[error("pseudo-terminal unavailable: {0}")]
    PtyUnavailable(String),

    #[error("shell spawn failed: {0}")]
    SpawnFailed(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AdapterError>;

// ---------------------------------------------------------------------------
// Channel contract
// ---------------------------------------------------------------------------

/// Which variant backs a session. Callers of the registry never branch on it;
/// it is reported for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Pty,
    Piped,
}

/// Process control and input half of a shell channel.
///
/// Output is not part of this trait: every variant hands its read side to
/// [`spawn_reader`] so draining behaves identically regardless of variant.
pub(crate) trait ShellChannel: Send {
    fn kind(&self) -> ChannelKind;

    /// Queue bytes for the child's input. Never blocks on the child.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Apply new screen dimensions; variants without a screen accept it as a no-op.
    fn resize(&mut self, rows: u16, cols: u16) -> Result<()>;

    /// Exit code once the child has exited, `None` while it is running.
    fn try_wait(&mut self) -> std::io::Result<Option<u32>>;

    fn pid(&self) -> Option<u32>;

    fn force_kill(&mut self) -> std::io::Result<()>;
}

/// Parameters for launching a shell.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub backend: BackendKind,
    pub rows: u16,
    pub cols: u16,
    /// Time a shell gets to exit after SIGHUP before it is killed.
    pub grace: Duration,
}

/// Result of [`ShellAdapter::terminate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The child had already exited (or was terminated earlier).
    AlreadyExited,
    /// The child exited within the grace period.
    Graceful,
    /// The child had to be killed.
    Forced,
    /// The kill was sent but the exit could not be observed in time.
    Unconfirmed,
}

// ---------------------------------------------------------------------------
// ShellAdapter
// ---------------------------------------------------------------------------

/// Owns exactly one shell child process and its I/O channel.
///
/// A dedicated reader thread moves output from the OS channel into a bounded
/// queue as soon as it arrives; [`drain_available`](Self::drain_available)
/// empties that queue without blocking.
pub struct ShellAdapter {
    channel: Box<dyn ShellChannel>,
    output: flume::Receiver<Vec<u8>>,
    _readers: Vec<JoinHandle<()>>,
    grace: Duration,
    exit_code: Option<u32>,
    exited: bool,
    channel_failed: bool,
    terminated: bool,
}

impl ShellAdapter {
    /// Resolve a shell and launch it on the configured backend.
    ///
    /// With [`BackendKind::Auto`] a pseudo-terminal is tried first and the
    /// piped variant is used only when the PTY primitive itself is unavailable.
    pub fn spawn(resolver: &dyn ShellResolver, opts: &SpawnOptions) -> Result<Self> {
        match opts.backend {
            BackendKind::Pty => Self::spawn_pty(resolver, opts),
            BackendKind::Piped => Self::spawn_piped(resolver, opts),
            BackendKind::Auto => match Self::spawn_pty(resolver, opts) {
                Err(AdapterError::PtyUnavailable(reason)) => {
                    warn!(%reason, "pseudo-terminal unavailable, falling back to piped shell");
                    Self::spawn_piped(resolver, opts)
                }
                other => other,
            },
        }
    }

    fn spawn_pty(resolver: &dyn ShellResolver, opts: &SpawnOptions) -> Result<Self> {
        let cmd = resolver.resolve(ChannelKind::Pty)?;
        let (channel, reader) = PtyChannel::open(&cmd, opts.rows, opts.cols)?;
        Self::assemble(Box::new(channel), vec![reader], opts)
    }

    fn spawn_piped(resolver: &dyn ShellResolver, opts: &SpawnOptions) -> Result<Self> {
        let cmd = resolver.resolve(ChannelKind::Piped)?;
        let (channel, readers) = PipedChannel::open(&cmd)?;
        Self::assemble(Box::new(channel), readers, opts)
    }

    /// Start the reader threads. If a thread cannot be started the child is
    /// killed before returning, so a failed spawn never leaves a process behind.
    fn assemble(
        mut channel: Box<dyn ShellChannel>,
        readers: Vec<Box<dyn Read + Send>>,
        opts: &SpawnOptions,
    ) -> Result<Self> {
        let kind = channel.kind();
        let (tx, rx) = flume::bounded::<Vec<u8>>(OUTPUT_QUEUE_CHUNKS);
        let mut threads = Vec::with_capacity(readers.len());
        for reader in readers {
            match spawn_reader(kind, reader, tx.clone()) {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    let _ = channel.force_kill();
                    let _ = channel.try_wait();
                    return Err(AdapterError::SpawnFailed(format!(
                        "failed to start output reader: {e}"
                    )));
                }
            }
        }
        drop(tx);

        info!(?kind, pid = ?channel.pid(), rows = opts.rows, cols = opts.cols, "shell spawned");

        Ok(Self {
            channel,
            output: rx,
            _readers: threads,
            grace: opts.grace,
            exit_code: None,
            exited: false,
            channel_failed: false,
            terminated: false,
        })
    }

    pub fn kind(&self) -> ChannelKind {
        self.channel.kind()
    }

    pub fn pid(&self) -> Option<u32> {
        self.channel.pid()
    }

    /// Exit code, once the child has been observed to exit.
    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    /// Forward raw bytes to the shell's input.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.is_alive() {
            return Err(AdapterError::ChannelClosed("shell has exited".into()));
        }
        self.channel.send(data).map_err(|e| {
            self.channel_failed = true;
            e
        })
    }

    /// Everything produced since the previous drain; empty if nothing arrived.
    pub fn drain_available(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            match self.output.try_recv() {
                Ok(chunk) => out.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.channel_failed {
                        debug!(pid = ?self.pid(), "output channel closed");
                    }
                    self.channel_failed = true;
                    break;
                }
            }
        }
        out
    }

    pub fn resize(&mut self, rows: u16, cols: u16) -> Result<()> {
        if !self.is_alive() {
            return Err(AdapterError::ChannelClosed("shell has exited".into()));
        }
        self.channel.resize(rows, cols)
    }

    /// Non-blocking liveness check. Once false, never true again.
    pub fn is_alive(&mut self) -> bool {
        !self.poll_exit() && !self.channel_failed
    }

    /// True once the child process has exited (independent of channel state).
    fn poll_exit(&mut self) -> bool {
        if self.exited {
            return true;
        }
        match self.channel.try_wait() {
            Ok(Some(code)) => {
                self.exited = true;
                self.exit_code = Some(code);
                debug!(pid = ?self.pid(), code, "shell exited");
            }
            Ok(None) => {}
            Err(e) => {
                debug!(pid = ?self.pid(), error = %e, "try_wait failed, treating shell as exited");
                self.exited = true;
            }
        }
        self.exited
    }

    /// Ask the shell to exit (SIGHUP to its process group), escalating to a
    /// forced kill once the grace period lapses. Idempotent.
    pub fn terminate(&mut self) -> Termination {
        if self.terminated {
            return Termination::AlreadyExited;
        }
        self.terminated = true;

        if self.poll_exit() {
            return Termination::AlreadyExited;
        }

        if let Some(pid) = self.pid() {
            signal_group(pid, GroupSignal::Hangup);
        }
        if self.wait_exit(self.grace) {
            return Termination::Graceful;
        }

        warn!(pid = ?self.pid(), grace_ms = self.grace.as_millis() as u64, "shell ignored hangup, killing");
        self.kill_group();
        if let Err(e) = self.channel.force_kill() {
            debug!(pid = ?self.pid(), error = %e, "force kill failed");
        }
        if self.wait_exit(KILL_CONFIRM) {
            Termination::Forced
        } else {
            Termination::Unconfirmed
        }
    }

    /// SIGKILL the shell's process group so background jobs die with it.
    /// Must run while the shell is still unreaped, so its pid still names
    /// the group.
    fn kill_group(&mut self) {
        if let Some(pid) = self.pid() {
            signal_group(pid, GroupSignal::Kill);
        }
    }

    fn wait_exit(&mut self, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        loop {
            if self.poll_exit() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(EXIT_POLL);
        }
    }
}

impl Drop for ShellAdapter {
    fn drop(&mut self) {
        if self.terminated || self.poll_exit() {
            return;
        }
        self.kill_group();
        let _ = self.channel.force_kill();
        self.wait_exit(KILL_CONFIRM);
    }
}

impl std::fmt::Debug for ShellAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellAdapter")
            .field("kind", &self.channel.kind())
            .field("pid", &self.channel.pid())
            .field("exited", &self.exited)
            .field("channel_failed", &self.channel_failed)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// I/O threads shared by both variants
// ---------------------------------------------------------------------------

/// Move bytes from `reader` into `tx` until EOF, an I/O error, or the
/// receiving adapter going away.
fn spawn_reader(
    kind: ChannelKind,
    mut reader: Box<dyn Read + Send>,
    tx: flume::Sender<Vec<u8>>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("sg-{kind:?}-reader").to_lowercase())
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        // EIO is how Linux reports a PTY whose child has exited.
                        debug!(?kind, "reader stopped: {e}");
                        break;
                    }
                }
            }
        })
}

/// Start the thread that owns the child's input stream. The returned sender
/// fails once the thread has stopped after a write error.
pub(crate) fn spawn_writer(
    kind: ChannelKind,
    mut writer: Box<dyn Write + Send>,
) -> std::io::Result<flume::Sender<Vec<u8>>> {
    let (tx, rx) = flume::unbounded::<Vec<u8>>();
    std::thread::Builder::new()
        .name(format!("sg-{kind:?}-writer").to_lowercase())
        .spawn(move || {
            while let Ok(data) = rx.recv() {
                if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                    debug!(?kind, "writer stopped: {e}");
                    break;
                }
            }
        })?;
    Ok(tx)
}

/// Hand `data` to a writer thread.
pub(crate) fn queue_input(tx: &flume::Sender<Vec<u8>>, data: Vec<u8>) -> Result<()> {
    tx.send(data)
        .map_err(|_| AdapterError::ChannelClosed("input writer stopped".into()))
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Hangup,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: GroupSignal) {
    if pid == 0 || pid > i32::MAX as u32 {
        warn!(pid, "pid out of range, cannot signal");
        return;
    }
    let signo = match signal {
        GroupSignal::Hangup => libc::SIGHUP,
        GroupSignal::Kill => libc::SIGKILL,
    };
    // Both variants start the shell as a process-group leader, so signalling
    // the group also reaches the jobs it launched.
    let rc = unsafe { libc::kill(-(pid as i32), signo) };
    if rc != 0 {
        debug!(pid, ?signal, error = %std::io::Error::last_os_error(), "group signal failed");
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: GroupSignal) {}
