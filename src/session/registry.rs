// src/session/registry.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use tracing::debug;

use crate::session::tracker::{LifecycleTracker, TrackerPhase};
use crate::types::{RunId, ScriptId, ScriptRequest};

/// One in-flight execution, from spawn to terminal state.
pub struct ScriptSession {
    pub id: ScriptId,
    pub run_id: RunId,
    pub source_text: String,
    pub timeout_secs: u64,
    pub capture_dump: bool,
    pub output_path: PathBuf,
    pub started_at: Instant,
    tracker: LifecycleTracker,
}

impl ScriptSession {
    pub fn new(id: ScriptId, run_id: RunId, request: ScriptRequest, output_path: PathBuf) -> Self {
        let tracker = LifecycleTracker::new(id.clone(), run_id);
        Self {
            id,
            run_id,
            source_text: request.text,
            timeout_secs: request.timeout_secs,
            capture_dump: request.capture_dump,
            output_path,
            started_at: Instant::now(),
            tracker,
        }
    }

    pub fn tracker(&self) -> &LifecycleTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut LifecycleTracker {
        &mut self.tracker
    }

    /// Release the session: disarm its timer, then drop it.
    pub fn dispose(mut self) {
        self.tracker.disarm();
        debug!(
            id = %self.id,
            run_id = self.run_id,
            elapsed_ms = self.started_at.elapsed().as_millis() as u64,
            "session disposed"
        );
    }
}

impl std::fmt::Debug for ScriptSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptSession")
            .field("id", &self.id)
            .field("run_id", &self.run_id)
            .field("timeout_secs", &self.timeout_secs)
            .field("capture_dump", &self.capture_dump)
            .field("tracker", &self.tracker.phase())
            .finish_non_exhaustive()
    }
}

/// The "active scripts" view: currently running sessions keyed by id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<ScriptId, ScriptSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session. Last write wins: a session already registered under
    /// the same id is handed back to the caller, untouched.
    pub fn add(&mut self, session: ScriptSession) -> Option<ScriptSession> {
        self.sessions.insert(session.id.clone(), session)
    }

    pub fn find(&self, id: &ScriptId) -> Option<&ScriptSession> {
        self.sessions.get(id)
    }

    /// Remove and dispose a session. Returns `false` if `id` is not active.
    pub fn remove(&mut self, id: &ScriptId) -> bool {
        match self.sessions.remove(id) {
            Some(session) => {
                session.dispose();
                true
            }
            None => false,
        }
    }

    /// Snapshot of the active identifiers.
    pub fn list_active_identifiers(&self) -> Vec<ScriptId> {
        self.sessions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove every session, e.g. at shutdown.
    pub fn drain(&mut self) -> impl Iterator<Item = ScriptSession> + use<> {
        std::mem::take(&mut self.sessions).into_values()
    }

    /// Count of sessions whose tracker is in `phase` (diagnostics).
    pub fn count_in_phase(&self, phase: TrackerPhase) -> usize {
        self.sessions
            .values()
            .filter(|s| s.tracker.phase() == phase)
            .count()
    }
}
