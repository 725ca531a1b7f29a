// src/engine/mod.rs

//! Script engine: the single task that owns every piece of mutable state.
//!
//! Callers talk to it through a [`ShellHandle`]; capture tasks and timers
//! report back through the same channel. Messages are processed one at a
//! time, so the runner table and the session registry are only ever touched
//! between awaits of one task and need no locking.
//!
//! The loop itself lives in [`runtime`]; the caller-facing handle in
//! [`handle`].

use std::fmt;
use std::path::PathBuf;

use tokio::sync::oneshot;

use crate::errors::{AcfShellError, Result};
use crate::exec::CaptureReport;
use crate::types::{RunId, ScriptId, ScriptOutcome, ScriptRequest};

pub mod handle;
pub mod runtime;

pub use handle::ShellHandle;
pub use runtime::{Engine, spawn_engine};

/// Messages flowing into the engine loop.
pub enum EngineMessage {
    /// Start a script.
    Start {
        request: ScriptRequest,
        reply: oneshot::Sender<Result<StartedScript>>,
    },
    /// Cancel the tracked run of a script.
    Cancel {
        id: ScriptId,
        reply: oneshot::Sender<bool>,
    },
    /// Cancel one run of a script, whether or not it is the tracked one.
    CancelRun {
        id: ScriptId,
        run_id: RunId,
        reply: oneshot::Sender<bool>,
    },
    /// Snapshot of the active script ids.
    ListActive {
        reply: oneshot::Sender<Vec<ScriptId>>,
    },
    /// A capture task saw its process exit.
    ScriptExited {
        id: ScriptId,
        run_id: RunId,
        report: CaptureReport,
    },
    /// A lifecycle tracker's deadline elapsed.
    DeadlineElapsed { id: ScriptId, run_id: RunId },
    /// Terminate everything and stop the loop.
    Shutdown { reply: oneshot::Sender<()> },
}

impl fmt::Debug for EngineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineMessage::Start { request, .. } => f
                .debug_struct("Start")
                .field("timeout_secs", &request.timeout_secs)
                .field("capture_dump", &request.capture_dump)
                .field("bytes", &request.text.len())
                .finish_non_exhaustive(),
            EngineMessage::Cancel { id, .. } => {
                f.debug_struct("Cancel").field("id", id).finish_non_exhaustive()
            }
            EngineMessage::CancelRun { id, run_id, .. } => f
                .debug_struct("CancelRun")
                .field("id", id)
                .field("run_id", run_id)
                .finish_non_exhaustive(),
            EngineMessage::ListActive { .. } => f.write_str("ListActive"),
            EngineMessage::ScriptExited { id, run_id, report } => f
                .debug_struct("ScriptExited")
                .field("id", id)
                .field("run_id", run_id)
                .field("report", report)
                .finish(),
            EngineMessage::DeadlineElapsed { id, run_id } => f
                .debug_struct("DeadlineElapsed")
                .field("id", id)
                .field("run_id", run_id)
                .finish(),
            EngineMessage::Shutdown { .. } => f.write_str("Shutdown"),
        }
    }
}

/// A successfully started script.
#[derive(Debug)]
pub struct StartedScript {
    pub id: ScriptId,
    pub run_id: RunId,
    pub output_path: PathBuf,
    pub completion: Completion,
}

/// Resolves to the outcome of one started script.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<ScriptOutcome>,
}

impl Completion {
    pub(crate) fn new(rx: oneshot::Receiver<ScriptOutcome>) -> Self {
        Self { rx }
    }

    /// Wait for the script to reach a terminal state.
    ///
    /// Fails only if the engine was torn down without an orderly shutdown.
    pub async fn outcome(self) -> Result<ScriptOutcome> {
        self.rx.await.map_err(|_| AcfShellError::EngineStopped)
    }
}
