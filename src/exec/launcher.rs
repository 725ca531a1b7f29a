// src/exec/launcher.rs

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

/// Spawns script files through a fixed interpreter.
///
/// The child gets no stdin, piped stdout/stderr, and is killed if its
/// handle is dropped before it exits.
#[derive(Debug, Clone)]
pub struct ShellLauncher {
    shell: PathBuf,
}

impl ShellLauncher {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &Path {
        &self.shell
    }

    /// Start `<shell> <script>`.
    pub fn spawn(&self, script: &Path) -> io::Result<Child> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn()?;
        debug!(shell = ?self.shell, script = ?script, pid = ?child.id(), "spawned script process");
        Ok(child)
    }
}
