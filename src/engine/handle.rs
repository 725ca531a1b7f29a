// src/engine/handle.rs

use tokio::sync::{mpsc, oneshot, watch};

use crate::errors::{AcfShellError, Result};
use crate::types::{RunId, ScriptId, ScriptRequest};

use super::{EngineMessage, StartedScript};

/// Cloneable control handle to a running engine.
///
/// This is the control surface: start, cancel, list, plus a watchable
/// mirror of the active list for observers that poll instead of calling.
#[derive(Debug, Clone)]
pub struct ShellHandle {
    tx: mpsc::Sender<EngineMessage>,
    active: watch::Receiver<Vec<ScriptId>>,
}

impl ShellHandle {
    pub(crate) fn new(tx: mpsc::Sender<EngineMessage>, active: watch::Receiver<Vec<ScriptId>>) -> Self {
        Self { tx, active }
    }

    /// Start a script and get a handle on its completion.
    pub async fn start(&self, request: ScriptRequest) -> Result<StartedScript> {
        self.request(|reply| EngineMessage::Start { request, reply })
            .await?
    }

    /// Control-surface form of [`start`](Self::start): returns only the id.
    pub async fn start_script(
        &self,
        text: impl Into<String>,
        timeout_secs: u64,
        want_dump: bool,
    ) -> Result<ScriptId> {
        let request = ScriptRequest::new(text)
            .with_timeout(timeout_secs)
            .with_dump(want_dump);
        Ok(self.start(request).await?.id)
    }

    /// Cancel a running script. `Ok(false)` if it is not active.
    pub async fn cancel(&self, id: &ScriptId) -> Result<bool> {
        let id = id.clone();
        self.request(|reply| EngineMessage::Cancel { id, reply }).await
    }

    /// Cancel one specific run, as returned in [`StartedScript::run_id`].
    ///
    /// Unlike [`cancel`](Self::cancel) this also reaches a run that was
    /// displaced by a later start of the same script. `Ok(false)` if that
    /// run already finished.
    pub async fn cancel_run(&self, id: &ScriptId, run_id: RunId) -> Result<bool> {
        let id = id.clone();
        self.request(|reply| EngineMessage::CancelRun { id, run_id, reply })
            .await
    }

    /// Identifiers of the scripts running right now.
    pub async fn list_active(&self) -> Result<Vec<ScriptId>> {
        self.request(|reply| EngineMessage::ListActive { reply }).await
    }

    /// The "active" attribute: updated by the engine after every change.
    pub fn watch_active(&self) -> watch::Receiver<Vec<ScriptId>> {
        self.active.clone()
    }

    /// Terminate every script and stop the engine loop.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| EngineMessage::Shutdown { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineMessage,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| AcfShellError::EngineStopped)?;
        reply_rx.await.map_err(|_| AcfShellError::EngineStopped)
    }
}
