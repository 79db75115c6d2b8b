use std::path::{Path, PathBuf};

use tracing::debug;

use crate::adapter::{AdapterError, ChannelKind};

/// A launchable shell: program, arguments and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Locates the shell to launch for a given channel variant.
pub trait ShellResolver: Send + Sync {
    fn resolve(&self, kind: ChannelKind) -> Result<ShellCommand, AdapterError>;
}

/// Resolves shells from configuration and the host environment.
///
/// Pseudo-terminal sessions get an interactive shell: the configured one,
/// then `$SHELL`, then `/bin/bash`, then `/bin/sh`. Piped sessions get a
/// shell that reads commands from stdin: `/bin/sh` on POSIX hosts,
/// `%COMSPEC%` (or `cmd.exe`) elsewhere.
#[derive(Debug, Clone)]
pub struct SystemShellResolver {
    explicit: Option<String>,
    term: String,
}

impl SystemShellResolver {
    pub fn new(explicit: Option<String>, term: impl Into<String>) -> Self {
        Self {
            explicit,
            term: term.into(),
        }
    }

    fn candidates(&self, kind: ChannelKind) -> Vec<String> {
        if let Some(explicit) = &self.explicit {
            // A configured shell that cannot be found is a host misconfiguration,
            // not a reason to silently launch something else.
            return vec![explicit.clone()];
        }

        let mut out = Vec::new();
        if cfg!(windows) {
            if let Ok(comspec) = std::env::var("COMSPEC") {
                out.push(comspec);
            }
            out.push("cmd.exe".to_string());
            return out;
        }

        if kind == ChannelKind::Pty {
            if let Ok(shell) = std::env::var("SHELL") {
                if !shell.is_empty() {
                    out.push(shell);
                }
            }
            out.push("/bin/bash".to_string());
        }
        out.push("/bin/sh".to_string());
        out
    }
}

impl ShellResolver for SystemShellResolver {
    fn resolve(&self, kind: ChannelKind) -> Result<ShellCommand, AdapterError> {
        let candidates = self.candidates(kind);
        for candidate in &candidates {
            if let Some(path) = locate(candidate) {
                debug!(shell = %path.display(), ?kind, "resolved shell");
                let program = path.to_string_lossy().into_owned();
                let cmd = match kind {
                    ChannelKind::Pty => ShellCommand::new(program).env("TERM", self.term.clone()),
                    ChannelKind::Piped if cfg!(windows) => ShellCommand::new(program).arg("/Q"),
                    ChannelKind::Piped => ShellCommand::new(program).env("TERM", "dumb"),
                };
                return Ok(cmd);
            }
        }
        Err(AdapterError::ShellNotFound(candidates.join(", ")))
    }
}

/// Find `program` on disk: paths are checked directly, bare names are
/// searched for on `PATH`.
pub(crate) fn locate(program: &str) -> Option<PathBuf> {
    let as_path = Path::new(program);
    if as_path.components().count() > 1 || as_path.is_absolute() {
        return as_path.is_file().then(|| as_path.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn explicit_shell_is_used() {
        let resolver = SystemShellResolver::new(Some("/bin/sh".into()), "xterm-256color");
        let cmd = resolver.resolve(ChannelKind::Pty).unwrap();
        assert_eq!(cmd.program, "/bin/sh");
        assert!(cmd
            .env
            .contains(&("TERM".to_string(), "xterm-256color".to_string())));
    }

    #[test]
    fn missing_explicit_shell_is_not_found() {
        let resolver = SystemShellResolver::new(Some("/no/such/shell".into()), "xterm");
        let err = resolver.resolve(ChannelKind::Pty).unwrap_err();
        assert!(matches!(err, AdapterError::ShellNotFound(ref tried) if tried.contains("/no/such/shell")));
    }

    #[test]
    fn piped_shell_falls_back_to_sh() {
        let resolver = SystemShellResolver::new(None, "xterm");
        let cmd = resolver.resolve(ChannelKind::Piped).unwrap();
        assert_eq!(cmd.program, "/bin/sh");
        assert!(cmd.env.contains(&("TERM".to_string(), "dumb".to_string())));
    }

    #[test]
    fn locate_searches_path_for_bare_names() {
        let found = locate("sh").expect("sh on PATH");
        assert!(found.is_absolute());
        assert!(locate("definitely-not-a-shell-binary").is_none());
    }
}
