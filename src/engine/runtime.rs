// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RunnerSection;
use crate::errors::Result;
use crate::exec::{DumpSink, Runner, Settled};
use crate::session::{ScriptSession, SessionRegistry, TrackerPhase};
use crate::store::fingerprint;
use crate::types::{CompletionHandler, RunId, ScriptId, ScriptRequest};

use super::handle::ShellHandle;
use super::{Completion, EngineMessage, StartedScript};

/// Capacity of the engine's inbound channel.
const ENGINE_CHANNEL_CAPACITY: usize = 64;

/// Spawn the engine loop on the current Tokio runtime.
///
/// The loop stops after [`ShellHandle::shutdown`], or once every handle is
/// dropped and no capture task is left to report.
pub fn spawn_engine(
    settings: &RunnerSection,
    dump: Arc<dyn DumpSink>,
) -> (ShellHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<EngineMessage>(ENGINE_CHANNEL_CAPACITY);
    let (active_tx, active_rx) = watch::channel(Vec::new());

    let runner = Runner::new(settings, dump, &tx);
    let engine = Engine::new(runner, rx, &tx, active_tx);
    let join = tokio::spawn(engine.run());

    (ShellHandle::new(tx, active_rx), join)
}

/// Owner of the runner, the session registry and the "active" mirror.
pub struct Engine {
    runner: Runner,
    sessions: SessionRegistry,
    /// Sessions displaced by a later start of the same script, keyed by run.
    shadowed: HashMap<RunId, ScriptSession>,
    rx: mpsc::Receiver<EngineMessage>,
    events: mpsc::WeakSender<EngineMessage>,
    active: watch::Sender<Vec<ScriptId>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("sessions", &self.sessions)
            .field("armed", &self.sessions.count_in_phase(TrackerPhase::Armed))
            .field("shadowed", &self.shadowed.len())
            .field("in_flight", &self.runner.in_flight())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        runner: Runner,
        rx: mpsc::Receiver<EngineMessage>,
        events: &mpsc::Sender<EngineMessage>,
        active: watch::Sender<Vec<ScriptId>>,
    ) -> Self {
        Self {
            runner,
            sessions: SessionRegistry::new(),
            shadowed: HashMap::new(),
            rx,
            events: events.downgrade(),
            active,
        }
    }

    /// Main loop: one message at a time until shutdown or channel close.
    pub async fn run(mut self) {
        info!(base_dir = ?self.runner.store().base_dir(), "script engine started");

        while let Some(message) = self.rx.recv().await {
            debug!(?message, "engine received message");

            match message {
                EngineMessage::Start { request, reply } => {
                    let result = self.handle_start(request);
                    let _ = reply.send(result);
                }
                EngineMessage::Cancel { id, reply } => {
                    let settled = self.runner.cancel(&id);
                    let _ = reply.send(self.settle(settled));
                }
                EngineMessage::CancelRun { id, run_id, reply } => {
                    let settled = self.runner.cancel_run(&id, run_id);
                    let _ = reply.send(self.settle(settled));
                }
                EngineMessage::ListActive { reply } => {
                    let _ = reply.send(self.sessions.list_active_identifiers());
                }
                EngineMessage::ScriptExited { id, run_id, report } => {
                    let settled = self.runner.finish(&id, run_id, report);
                    self.settle(settled);
                }
                EngineMessage::DeadlineElapsed { id, run_id } => {
                    let settled = self.runner.time_out(&id, run_id);
                    self.settle(settled);
                }
                EngineMessage::Shutdown { reply } => {
                    self.shutdown(Some(reply));
                    return;
                }
            }

            self.publish_active();
        }

        info!("engine channel closed");
        self.shutdown(None);
    }

    fn handle_start(&mut self, request: ScriptRequest) -> Result<StartedScript> {
        let id = fingerprint(&request.text);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let on_complete: CompletionHandler = Box::new(move |outcome, id| {
            if outcome_tx.send(outcome).is_err() {
                debug!(id = %id, %outcome, "no one waiting for script completion");
            }
        });

        let run_id = self
            .runner
            .start(&id, &request.text, request.capture_dump, on_complete)?;

        let output_path = self.runner.store().output_path(&id);
        let timeout_secs = request.timeout_secs;
        let mut session = ScriptSession::new(id.clone(), run_id, request, output_path.clone());
        if let Some(events) = self.events.upgrade() {
            session.tracker_mut().arm(timeout_secs, &events);
        }

        if let Some(previous) = self.sessions.add(session) {
            warn!(
                id = %id,
                run_id,
                shadowed_run_id = previous.run_id,
                "identical script already active; earlier run is no longer listed"
            );
            self.shadowed.insert(previous.run_id, previous);
        }

        Ok(StartedScript {
            id,
            run_id,
            output_path,
            completion: Completion::new(outcome_rx),
        })
    }

    /// Retire the session of a settled run and publish the new active list,
    /// then run its handler: whoever observes the outcome already sees the
    /// script gone.
    fn settle(&mut self, settled: Option<Settled>) -> bool {
        let Some(settled) = settled else {
            return false;
        };
        self.retire(&settled.id, settled.run_id);
        self.publish_active();
        settled.notify();
        true
    }

    /// Drop the session that belongs to a run the runner just finished.
    fn retire(&mut self, id: &ScriptId, run_id: RunId) {
        if self.sessions.find(id).is_some_and(|s| s.run_id == run_id) {
            self.sessions.remove(id);
        } else if let Some(session) = self.shadowed.remove(&run_id) {
            session.dispose();
        }
    }

    fn publish_active(&self) {
        let current = self.sessions.list_active_identifiers();
        self.active.send_if_modified(|active| {
            if *active == current {
                false
            } else {
                *active = current;
                true
            }
        });
    }

    fn shutdown(&mut self, reply: Option<oneshot::Sender<()>>) {
        info!(
            active = self.sessions.len(),
            armed = self.sessions.count_in_phase(TrackerPhase::Armed),
            shadowed = self.shadowed.len(),
            "script engine shutting down"
        );
        let settled = self.runner.shutdown();
        for session in self.sessions.drain() {
            session.dispose();
        }
        for (_, session) in self.shadowed.drain() {
            session.dispose();
        }
        self.publish_active();
        settled.into_iter().for_each(Settled::notify);

        if let Some(reply) = reply {
            let _ = reply.send(());
        }
    }
}
