// src/exec/dump.rs

//! Diagnostic-dump notification issued when a script completes.
//!
//! The runner never waits on a dump: it spawns the request and only logs a
//! failure. [`CommandDumpSink`] is the production implementation; tests plug
//! in their own [`DumpSink`] to observe requests.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::DumpSection;
use crate::errors::Result;
use crate::types::ScriptId;

/// Receiver of "create diagnostic dump" requests.
pub trait DumpSink: Send + Sync {
    fn create_dump(
        &self,
        id: &ScriptId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Sink used when no dump command is configured: logs the request only.
#[derive(Debug, Clone, Default)]
pub struct LogOnlyDumpSink;

impl DumpSink for LogOnlyDumpSink {
    fn create_dump(
        &self,
        id: &ScriptId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let id = id.clone();
        Box::pin(async move {
            info!(id = %id, "dump requested but no dump command configured");
            Ok(())
        })
    }
}

/// Runs a shell command for every dump request.
///
/// The command is executed with `sh -c`, with `ACF_SCRIPT_ID` set to the
/// identifier of the completed script. A non-zero exit is an error.
#[derive(Debug, Clone)]
pub struct CommandDumpSink {
    command: String,
}

impl CommandDumpSink {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl DumpSink for CommandDumpSink {
    fn create_dump(
        &self,
        id: &ScriptId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let id = id.clone();
        Box::pin(async move {
            debug!(id = %id, cmd = %self.command, "running dump command");
            let status = Command::new("sh")
                .arg("-c")
                .arg(&self.command)
                .env("ACF_SCRIPT_ID", id.as_str())
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .with_context(|| format!("spawning dump command for script {id}"))?;

            if !status.success() {
                return Err(anyhow!("dump command for script {id} exited with {status}").into());
            }
            info!(id = %id, "dump created");
            Ok(())
        })
    }
}

/// Pick the sink matching the `[dump]` config section.
pub fn dump_sink_from_config(section: &DumpSection) -> Arc<dyn DumpSink> {
    match &section.command {
        Some(cmd) => Arc::new(CommandDumpSink::new(cmd.clone())),
        None => Arc::new(LogOnlyDumpSink),
    }
}
