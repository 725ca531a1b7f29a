#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use acfshell::config::RunnerSection;
use acfshell::engine::spawn_engine;
use acfshell::exec::DumpSink;
use acfshell::ShellHandle;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::recording_dump::RecordingDumpSink;

/// Builder for a `RunnerSection` rooted in a fresh temporary directory.
///
/// Scripts run under `/bin/sh` so tests don't depend on bash being
/// installed.
pub struct RunnerBuilder {
    dir: TempDir,
    shell: PathBuf,
    chunk_size: usize,
}

impl RunnerBuilder {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
            shell: PathBuf::from("/bin/sh"),
            chunk_size: 4096,
        }
    }

    pub fn shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Settings plus the temp dir guard; keep the guard alive for the test.
    pub fn build(self) -> (RunnerSection, TempDir) {
        let section = RunnerSection {
            base_dir: self.dir.path().join("acf"),
            shell: self.shell,
            chunk_size: self.chunk_size,
        };
        (section, self.dir)
    }
}

impl Default for RunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running engine wired to a [`RecordingDumpSink`].
pub struct TestEngine {
    pub handle: ShellHandle,
    pub join: JoinHandle<()>,
    pub dumps: Arc<RecordingDumpSink>,
    pub settings: RunnerSection,
    _dir: TempDir,
}

impl TestEngine {
    pub fn start() -> Self {
        Self::with_dump_sink(RunnerBuilder::new(), RecordingDumpSink::new())
    }

    pub fn with_dump_sink(builder: RunnerBuilder, dumps: RecordingDumpSink) -> Self {
        let (settings, dir) = builder.build();
        let dumps = Arc::new(dumps);
        let sink: Arc<dyn DumpSink> = dumps.clone();
        let (handle, join) = spawn_engine(&settings, sink);
        Self {
            handle,
            join,
            dumps,
            settings,
            _dir: dir,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.settings.base_dir
    }
}
