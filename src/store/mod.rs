// src/store/mod.rs

//! On-disk layout for scripts and their captured output.
//!
//! Every script gets its own directory under a fixed base:
//!
//! ```text
//! <base>/<id>/<id>.sh    script source as written
//! <base>/<id>/<id>.out   captured stdout + stderr
//! ```
//!
//! Directories are never removed; a later run of the same text truncates
//! both files.

pub mod fingerprint;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::types::ScriptId;

pub use fingerprint::fingerprint;

#[derive(Debug, Clone)]
pub struct ScriptStore {
    base_dir: PathBuf,
}

impl ScriptStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn script_dir(&self, id: &ScriptId) -> PathBuf {
        self.base_dir.join(id.as_str())
    }

    pub fn script_path(&self, id: &ScriptId) -> PathBuf {
        self.script_dir(id).join(format!("{id}.sh"))
    }

    pub fn output_path(&self, id: &ScriptId) -> PathBuf {
        self.script_dir(id).join(format!("{id}.out"))
    }

    /// Write the script text to its deterministic path, creating the
    /// per-id directory if needed.
    pub fn persist(&self, id: &ScriptId, text: &str) -> Result<PathBuf> {
        self.ensure_dir(id)?;
        let path = self.script_path(id);
        let mut file =
            File::create(&path).with_context(|| format!("creating script file {:?}", path))?;
        file.write_all(text.as_bytes())
            .with_context(|| format!("writing script file {:?}", path))?;
        debug!(id = %id, path = ?path, bytes = text.len(), "persisted script");
        Ok(path)
    }

    /// Create (or truncate) the output file for a run.
    pub fn create_output(&self, id: &ScriptId) -> Result<File> {
        self.ensure_dir(id)?;
        let path = self.output_path(id);
        File::create(&path).with_context(|| format!("creating output file {:?}", path))
    }

    fn ensure_dir(&self, id: &ScriptId) -> Result<()> {
        let dir = self.script_dir(id);
        fs::create_dir_all(&dir).with_context(|| format!("creating script dir {:?}", dir))
    }
}
