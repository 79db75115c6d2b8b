use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::debug;

use crate::adapter::{self, AdapterError, ChannelKind, Result, ShellChannel};
use crate::shell::ShellCommand;

/// Shell driven over plain pipes, for hosts without a pseudo-terminal.
///
/// There is no line discipline on a pipe, so input is edited here instead:
/// bytes are held until a line terminator arrives, BS/DEL erase the previous
/// byte, and only complete lines reach the shell. stdout and stderr are merged
/// into one output stream.
pub(crate) struct PipedChannel {
    child: Child,
    input: flume::Sender<Vec<u8>>,
    line: Vec<u8>,
    last_was_cr: bool,
}

impl PipedChannel {
    /// Start `cmd` with piped stdio. Returns the channel and the stdout and
    /// stderr read sides for the adapter's reader threads.
    pub(crate) fn open(cmd: &ShellCommand) -> Result<(Self, Vec<Box<dyn Read + Send>>)> {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group so a hangup reaches every job the shell started.
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|e| AdapterError::SpawnFailed(format!("{}: {e}", cmd.program)))?;

        let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AdapterError::SpawnFailed("child stdio was not captured".into()));
            }
        };

        let input = match adapter::spawn_writer(ChannelKind::Piped, Box::new(stdin)) {
            Ok(tx) => tx,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AdapterError::SpawnFailed(format!(
                    "failed to start input writer: {e}"
                )));
            }
        };

        debug!(program = %cmd.program, pid = child.id(), "piped shell started");

        let readers: Vec<Box<dyn Read + Send>> = vec![Box::new(stdout), Box::new(stderr)];
        Ok((
            Self {
                child,
                input,
                line: Vec::new(),
                last_was_cr: false,
            },
            readers,
        ))
    }

    /// Apply line editing to `data`, returning the completed lines (each
    /// terminated with LF) ready for the shell.
    fn edit(&mut self, data: &[u8]) -> Vec<u8> {
        let mut ready = Vec::new();
        for &byte in data {
            let after_cr = std::mem::replace(&mut self.last_was_cr, false);
            match byte {
                b'\n' if after_cr => {}
                b'\r' | b'\n' => {
                    self.last_was_cr = byte == b'\r';
                    ready.append(&mut self.line);
                    ready.push(b'\n');
                }
                0x7f | 0x08 => {
                    self.line.pop();
                }
                _ => self.line.push(byte),
            }
        }
        ready
    }
}

fn exit_code(status: ExitStatus) -> u32 {
    if let Some(code) = status.code() {
        return code as u32;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal as u32;
        }
    }
    1
}

impl ShellChannel for PipedChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Piped
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        let ready = self.edit(data);
        if ready.is_empty() {
            return Ok(());
        }
        adapter::queue_input(&self.input, ready)
    }

    fn resize(&mut self, _rows: u16, _cols: u16) -> Result<()> {
        Ok(())
    }

    fn try_wait(&mut self) -> std::io::Result<Option<u32>> {
        Ok(self.child.try_wait()?.map(exit_code))
    }

    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn force_kill(&mut self) -> std::io::Result<()> {
        self.child.kill()
    }
}
