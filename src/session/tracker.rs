// src/session/tracker.rs

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::engine::EngineMessage;
use crate::types::{RunId, ScriptId};

/// Observable state of a [`LifecycleTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    /// Never armed, or armed with a zero timeout.
    Idle,
    /// A deadline is pending.
    Armed,
    /// Terminal. No transition out of this state.
    Disarmed,
}

enum TrackerState {
    Idle,
    Armed(JoinHandle<()>),
    Disarmed,
}

/// Timeout guard for one running script.
///
/// The tracker owns its timer task outright. When the deadline elapses the
/// timer sends `EngineMessage::DeadlineElapsed` for this exact run; the
/// engine then asks the runner to terminate it. Dropping the tracker
/// disarms the timer, so a finished session can never be hit by a stray
/// timeout.
pub struct LifecycleTracker {
    id: ScriptId,
    run_id: RunId,
    state: TrackerState,
}

impl LifecycleTracker {
    pub fn new(id: ScriptId, run_id: RunId) -> Self {
        Self {
            id,
            run_id,
            state: TrackerState::Idle,
        }
    }

    pub fn phase(&self) -> TrackerPhase {
        match self.state {
            TrackerState::Idle => TrackerPhase::Idle,
            TrackerState::Armed(_) => TrackerPhase::Armed,
            TrackerState::Disarmed => TrackerPhase::Disarmed,
        }
    }

    /// Schedule the deadline. `timeout_secs == 0` means no timeout.
    ///
    /// Only an idle tracker can be armed; arming twice, or after disarm, is
    /// ignored. Must be called from within a Tokio runtime.
    pub fn arm(&mut self, timeout_secs: u64, events: &mpsc::Sender<EngineMessage>) {
        if timeout_secs == 0 {
            trace!(id = %self.id, run_id = self.run_id, "no timeout requested");
            return;
        }
        if !matches!(self.state, TrackerState::Idle) {
            debug!(id = %self.id, run_id = self.run_id, "tracker not idle; arm ignored");
            return;
        }

        let id = self.id.clone();
        let run_id = self.run_id;
        let events = events.downgrade();
        let deadline = Duration::from_secs(timeout_secs);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            debug!(id = %id, run_id, "deadline elapsed");
            // A stopped engine has nothing left to time out.
            if let Some(events) = events.upgrade() {
                let _ = events
                    .send(EngineMessage::DeadlineElapsed { id, run_id })
                    .await;
            }
        });

        debug!(id = %self.id, run_id = self.run_id, timeout_secs, "deadline armed");
        self.state = TrackerState::Armed(handle);
    }

    /// Cancel any pending deadline. Idempotent.
    pub fn disarm(&mut self) {
        if let TrackerState::Armed(handle) = &self.state {
            handle.abort();
            trace!(id = %self.id, run_id = self.run_id, "deadline disarmed");
        }
        self.state = TrackerState::Disarmed;
    }
}

impl Drop for LifecycleTracker {
    fn drop(&mut self) {
        self.disarm();
    }
}
