// src/config/validate.rs

use crate::config::model::{ConfigFile, DumpSection, RawConfigFile, RunnerSection};
use crate::errors::{AcfShellError, Result};

/// Upper bound on `[runner].chunk_size`.
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AcfShellError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.runner, raw.dump))
    }
}

/// Check the semantic constraints serde cannot express.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_runner(&cfg.runner)?;
    validate_dump(&cfg.dump)?;
    Ok(())
}

fn validate_runner(runner: &RunnerSection) -> Result<()> {
    if runner.base_dir.as_os_str().is_empty() {
        return Err(AcfShellError::ConfigError(
            "[runner].base_dir must not be empty".to_string(),
        ));
    }

    if runner.shell.as_os_str().is_empty() {
        return Err(AcfShellError::ConfigError(
            "[runner].shell must not be empty".to_string(),
        ));
    }

    if runner.chunk_size == 0 || runner.chunk_size > MAX_CHUNK_SIZE {
        return Err(AcfShellError::ConfigError(format!(
            "[runner].chunk_size must be between 1 and {} (got {})",
            MAX_CHUNK_SIZE, runner.chunk_size
        )));
    }

    Ok(())
}

fn validate_dump(dump: &DumpSection) -> Result<()> {
    if let Some(cmd) = &dump.command {
        if cmd.trim().is_empty() {
            return Err(AcfShellError::ConfigError(
                "[dump].command must not be blank when present".to_string(),
            ));
        }
    }
    Ok(())
}
