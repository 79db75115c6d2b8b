use std::io::Read;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tracing::debug;

use crate::adapter::{self, AdapterError, ChannelKind, Result, ShellChannel};
use crate::shell::ShellCommand;

/// Shell attached to a pseudo-terminal. The child is a session leader, so it
/// sees a real TTY with job control and receives window-size changes.
pub(crate) struct PtyChannel {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    input: flume::Sender<Vec<u8>>,
}

impl PtyChannel {
    /// Open a PTY of the given size and start `cmd` on it. Returns the channel
    /// and the master's read side for the adapter's reader thread.
    pub(crate) fn open(
        cmd: &ShellCommand,
        rows: u16,
        cols: u16,
    ) -> Result<(Self, Box<dyn Read + Send>)> {
        let pair = native_pty_system()
            .openpty(pty_size(rows, cols))
            .map_err(|e| AdapterError::PtyUnavailable(e.to_string()))?;

        // Take both I/O halves before starting the child so a failure here
        // never leaves a running process without a handle.
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| AdapterError::PtyUnavailable(format!("clone reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| AdapterError::PtyUnavailable(format!("take writer: {e}")))?;

        let mut command = CommandBuilder::new(&cmd.program);
        for arg in &cmd.args {
            command.arg(arg);
        }
        for (k, v) in &cmd.env {
            command.env(k, v);
        }

        let mut child = pair
            .slave
            .spawn_command(command)
            .map_err(|e| AdapterError::SpawnFailed(format!("{}: {e}", cmd.program)))?;
        // The child holds its own copy; keeping ours would stop EOF reaching the reader.
        drop(pair.slave);

        let input = match adapter::spawn_writer(ChannelKind::Pty, writer) {
            Ok(tx) => tx,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AdapterError::SpawnFailed(format!(
                    "failed to start input writer: {e}"
                )));
            }
        };

        debug!(program = %cmd.program, pid = ?child.process_id(), rows, cols, "pty shell started");

        Ok((
            Self {
                master: pair.master,
                child,
                input,
            },
            reader,
        ))
    }
}

fn pty_size(rows: u16, cols: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

impl ShellChannel for PtyChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Pty
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        adapter::queue_input(&self.input, data.to_vec())
    }

    fn resize(&mut self, rows: u16, cols: u16) -> Result<()> {
        self.master
            .resize(pty_size(rows, cols))
            .map_err(|e| AdapterError::Io(std::io::Error::other(format!("resize failed: {e}"))))?;
        debug!(rows, cols, "pty resized");
        Ok(())
    }

    fn try_wait(&mut self) -> std::io::Result<Option<u32>> {
        Ok(self.child.try_wait()?.map(|status| status.exit_code()))
    }

    fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    fn force_kill(&mut self) -> std::io::Result<()> {
        self.child.kill()
    }
}
