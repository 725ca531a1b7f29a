// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

/// Configuration exactly as read from a TOML file.
///
/// ```toml
/// [runner]
/// base_dir = "/tmp/acf"
/// shell = "/usr/bin/bash"
/// chunk_size = 4096
///
/// [dump]
/// command = "busctl call xyz.openbmc_project.Dump.Manager ..."
/// ```
///
/// Every section is optional. Turn it into a [`ConfigFile`] with
/// `ConfigFile::try_from`, which runs validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub runner: RunnerSection,

    #[serde(default)]
    pub dump: DumpSection,
}

/// Validated configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub runner: RunnerSection,
    pub dump: DumpSection,
}

impl ConfigFile {
    /// Build without validation. Used by `TryFrom<RawConfigFile>` once the
    /// checks have passed.
    pub(crate) fn new_unchecked(runner: RunnerSection, dump: DumpSection) -> Self {
        Self { runner, dump }
    }
}

/// `[runner]` section: where scripts live and how they are executed.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerSection {
    /// Base directory for `<id>/<id>.sh` and `<id>/<id>.out`.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Interpreter invoked with the script path as its only argument.
    #[serde(default = "default_shell")]
    pub shell: PathBuf,

    /// Read size used when capturing stdout/stderr.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/tmp/acf")
}

fn default_shell() -> PathBuf {
    PathBuf::from("/usr/bin/bash")
}

fn default_chunk_size() -> usize {
    4096
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            shell: default_shell(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// `[dump]` section.
///
/// Without a `command`, dump requests are only logged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DumpSection {
    #[serde(default)]
    pub command: Option<String>,
}
