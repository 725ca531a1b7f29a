// src/exec/runner.rs

//! The live-process table.
//!
//! `Runner` turns a script into a running child process and guarantees that
//! the completion handler given to [`Runner::start`] is handed out exactly
//! once: on natural exit, on cancel, on timeout, or at shutdown. Every
//! terminal path removes the entry and returns it as a [`Settled`], so a
//! second terminal event for the same run finds nothing and is a no-op. The
//! caller updates its own views first and then calls [`Settled::notify`].
//!
//! All methods are synchronous and must be called from the single task that
//! owns the runner (the engine loop). The only asynchronous work (output
//! capture, dump requests) runs in spawned tasks that report back through
//! the engine's channel.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::RunnerSection;
use crate::engine::EngineMessage;
use crate::errors::{AcfShellError, Result};
use crate::exec::capture::{CaptureJob, CaptureReport, run_capture};
use crate::exec::dump::DumpSink;
use crate::exec::launcher::ShellLauncher;
use crate::store::ScriptStore;
use crate::types::{CompletionHandler, RunId, ScriptId, ScriptOutcome};

/// Runner-side state of one spawned process.
///
/// The child itself is owned by the capture task; the runner keeps only the
/// switch that tells that task to kill it.
struct LiveProcess {
    run_id: RunId,
    kill: Option<oneshot::Sender<()>>,
    capture_dump: bool,
    on_complete: CompletionHandler,
}

impl LiveProcess {
    fn terminate(&mut self, id: &ScriptId) {
        match self.kill.take() {
            Some(kill) => {
                if kill.send(()).is_err() {
                    debug!(id = %id, run_id = self.run_id, "capture task already finished");
                }
            }
            None => {
                debug!(id = %id, run_id = self.run_id, "process already signalled");
            }
        }
    }
}

/// A run that reached its terminal state. Its handler runs on
/// [`notify`](Settled::notify).
#[must_use = "the completion handler only runs on notify()"]
pub struct Settled {
    pub id: ScriptId,
    pub run_id: RunId,
    pub outcome: ScriptOutcome,
    on_complete: CompletionHandler,
}

impl Settled {
    pub fn notify(self) {
        (self.on_complete)(self.outcome, self.id);
    }
}

impl std::fmt::Debug for Settled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settled")
            .field("id", &self.id)
            .field("run_id", &self.run_id)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

pub struct Runner {
    store: ScriptStore,
    launcher: ShellLauncher,
    dump: Arc<dyn DumpSink>,
    chunk_size: usize,
    events: mpsc::WeakSender<EngineMessage>,
    /// At most one tracked run per id (last start wins).
    live: BTreeMap<ScriptId, LiveProcess>,
    /// Runs displaced from `live` by a later start with the same id. They
    /// still complete exactly once, but cannot be cancelled by id.
    displaced: HashMap<RunId, (ScriptId, LiveProcess)>,
    next_run_id: RunId,
}

impl Runner {
    /// Build a runner whose capture tasks report to `events`.
    ///
    /// Only a weak sender is kept, so the runner alone never keeps the
    /// engine channel open.
    pub fn new(
        settings: &RunnerSection,
        dump: Arc<dyn DumpSink>,
        events: &mpsc::Sender<EngineMessage>,
    ) -> Self {
        Self {
            store: ScriptStore::new(&settings.base_dir),
            launcher: ShellLauncher::new(&settings.shell),
            dump,
            chunk_size: settings.chunk_size,
            events: events.downgrade(),
            live: BTreeMap::new(),
            displaced: HashMap::new(),
            next_run_id: 1,
        }
    }

    pub fn store(&self) -> &ScriptStore {
        &self.store
    }

    pub fn is_running(&self, id: &ScriptId) -> bool {
        self.live.contains_key(id)
    }

    /// Number of processes still owed a completion, displaced ones included.
    pub fn in_flight(&self) -> usize {
        self.live.len() + self.displaced.len()
    }

    /// Persist the script, spawn it, and start capturing its output.
    ///
    /// On error nothing is registered and `on_complete` is dropped without
    /// being called. On success the runner owns the obligation to call it
    /// exactly once.
    pub fn start(
        &mut self,
        id: &ScriptId,
        text: &str,
        capture_dump: bool,
        on_complete: CompletionHandler,
    ) -> Result<RunId> {
        let events = self.events.upgrade().ok_or(AcfShellError::EngineStopped)?;

        let script_path = self.store.persist(id, text).map_err(|e| {
            error!(id = %id, error = %e, "failed to write script file");
            AcfShellError::StartFailed(format!("{e:#}"))
        })?;

        let output = self.store.create_output(id).map_err(|e| {
            error!(id = %id, error = %e, "failed to create output file");
            AcfShellError::StartFailed(format!("{e:#}"))
        })?;

        let child = self.launcher.spawn(&script_path).map_err(|e| {
            error!(
                id = %id,
                shell = ?self.launcher.shell(),
                error = %e,
                "failed to spawn script process"
            );
            AcfShellError::StartFailed(format!(
                "spawning {:?} for script {id}: {e}",
                self.launcher.shell()
            ))
        })?;
        let pid = child.id();

        let run_id = self.next_run_id;
        self.next_run_id += 1;

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        tokio::spawn(run_capture(CaptureJob {
            id: id.clone(),
            run_id,
            child,
            output: tokio::fs::File::from_std(output),
            chunk_size: self.chunk_size,
            events,
            kill_rx,
        }));

        let entry = LiveProcess {
            run_id,
            kill: Some(kill_tx),
            capture_dump,
            on_complete,
        };

        if let Some(previous) = self.live.insert(id.clone(), entry) {
            warn!(
                id = %id,
                run_id,
                displaced_run_id = previous.run_id,
                "script id already running; new run replaces it in the table"
            );
            self.displaced.insert(previous.run_id, (id.clone(), previous));
        }

        info!(id = %id, run_id, pid = ?pid, "script started");
        Ok(run_id)
    }

    /// Terminate the tracked run of `id` and report it as cancelled.
    ///
    /// `None` if `id` is not running.
    pub fn cancel(&mut self, id: &ScriptId) -> Option<Settled> {
        let Some(entry) = self.live.remove(id) else {
            debug!(id = %id, "cancel requested for unknown script");
            return None;
        };
        info!(id = %id, run_id = entry.run_id, "cancelling script");
        Some(Self::settle(id.clone(), entry, ScriptOutcome::Cancelled))
    }

    /// Cancel one specific run of `id`, including a run displaced by a later
    /// start of the same script.
    pub fn cancel_run(&mut self, id: &ScriptId, run_id: RunId) -> Option<Settled> {
        let Some(entry) = self.take_run(id, run_id) else {
            debug!(id = %id, run_id, "cancel requested for finished run");
            return None;
        };
        info!(id = %id, run_id, "cancelling script run");
        Some(Self::settle(id.clone(), entry, ScriptOutcome::Cancelled))
    }

    /// Terminate run `run_id` of `id` because its deadline elapsed.
    ///
    /// A deadline for a run that already finished is a no-op.
    pub fn time_out(&mut self, id: &ScriptId, run_id: RunId) -> Option<Settled> {
        let Some(entry) = self.take_run(id, run_id) else {
            debug!(id = %id, run_id, "deadline for finished run ignored");
            return None;
        };
        warn!(id = %id, run_id, "script timed out");
        Some(Self::settle(id.clone(), entry, ScriptOutcome::TimedOut))
    }

    /// Natural completion, as reported by the capture task.
    ///
    /// `None` if the run was already cancelled or timed out.
    pub fn finish(&mut self, id: &ScriptId, run_id: RunId, report: CaptureReport) -> Option<Settled> {
        let Some(entry) = self.take_run(id, run_id) else {
            debug!(id = %id, run_id, "exit of already-finished run ignored");
            return None;
        };

        if entry.capture_dump {
            self.request_dump(id);
        }

        let outcome = ScriptOutcome::Completed {
            exit_code: report.exit_code,
            output_complete: report.output_complete(),
        };
        if let Some(err) = &report.stream_error {
            warn!(id = %id, run_id, error = %err, "script output is incomplete");
        }
        info!(id = %id, run_id, outcome = %outcome, "script finished");
        Some(Settled {
            id: id.clone(),
            run_id,
            outcome,
            on_complete: entry.on_complete,
        })
    }

    /// Terminate every run and report each one as cancelled.
    pub fn shutdown(&mut self) -> Vec<Settled> {
        let live = std::mem::take(&mut self.live);
        let displaced = std::mem::take(&mut self.displaced);
        if !live.is_empty() || !displaced.is_empty() {
            info!(
                running = live.len(),
                displaced = displaced.len(),
                "terminating remaining scripts"
            );
        }

        live.into_iter()
            .chain(displaced.into_values())
            .map(|(id, entry)| Self::settle(id, entry, ScriptOutcome::Cancelled))
            .collect()
    }

    fn take_run(&mut self, id: &ScriptId, run_id: RunId) -> Option<LiveProcess> {
        if self.live.get(id).is_some_and(|e| e.run_id == run_id) {
            return self.live.remove(id);
        }
        match self.displaced.get(&run_id) {
            Some((displaced_id, _)) if displaced_id == id => {
                self.displaced.remove(&run_id).map(|(_, entry)| entry)
            }
            _ => None,
        }
    }

    fn settle(id: ScriptId, mut entry: LiveProcess, outcome: ScriptOutcome) -> Settled {
        entry.terminate(&id);
        Settled {
            run_id: entry.run_id,
            id,
            outcome,
            on_complete: entry.on_complete,
        }
    }

    fn request_dump(&self, id: &ScriptId) {
        let sink = Arc::clone(&self.dump);
        let id = id.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.create_dump(&id).await {
                warn!(id = %id, error = %e, "diagnostic dump request failed");
            }
        });
    }
}

impl Drop for Runner {
    /// Kill whatever is still running. Handlers are not invoked here; use
    /// [`Runner::shutdown`] for an orderly stop.
    fn drop(&mut self) {
        for (id, entry) in self.live.iter_mut() {
            entry.terminate(id);
        }
        for (id, entry) in self.displaced.values_mut() {
            entry.terminate(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::dump::LogOnlyDumpSink;
    use crate::store::fingerprint;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    type Calls = Arc<Mutex<Vec<(ScriptOutcome, ScriptId)>>>;

    fn runner(tmp: &TempDir) -> (Runner, mpsc::Sender<EngineMessage>, mpsc::Receiver<EngineMessage>) {
        let settings = RunnerSection {
            base_dir: tmp.path().to_path_buf(),
            shell: "/bin/sh".into(),
            chunk_size: 4096,
        };
        let (tx, rx) = mpsc::channel(16);
        (Runner::new(&settings, Arc::new(LogOnlyDumpSink), &tx), tx, rx)
    }

    fn recorder() -> (Calls, CompletionHandler) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let handler: CompletionHandler = Box::new(move |outcome, id| {
            sink.lock().unwrap().push((outcome, id));
        });
        (calls, handler)
    }

    /// Notify if settled; report whether anything was.
    fn fire(settled: Option<Settled>) -> bool {
        settled.map(Settled::notify).is_some()
    }

    async fn next_exit(rx: &mut mpsc::Receiver<EngineMessage>) -> (ScriptId, RunId, CaptureReport) {
        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for exit")
            .expect("channel closed");
        match msg {
            EngineMessage::ScriptExited { id, run_id, report } => (id, run_id, report),
            other => panic!("expected ScriptExited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn natural_exit_reports_completed_once() {
        let tmp = TempDir::new().unwrap();
        let (mut runner, _tx, mut rx) = runner(&tmp);
        let (calls, handler) = recorder();
        let id = fingerprint("echo out; echo err >&2; exit 3");

        let run_id = runner
            .start(&id, "echo out; echo err >&2; exit 3", false, handler)
            .unwrap();
        assert!(runner.is_running(&id));

        let (exited_id, exited_run, report) = next_exit(&mut rx).await;
        assert_eq!((exited_id.clone(), exited_run), (id.clone(), run_id));
        assert_eq!(report.exit_code, Some(3));

        let settled = runner.finish(&exited_id, exited_run, report.clone()).unwrap();
        assert!(!runner.is_running(&id));
        // Nothing runs until the caller notifies.
        assert!(calls.lock().unwrap().is_empty());
        settled.notify();
        assert!(!fire(runner.finish(&exited_id, exited_run, report)));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].0,
            ScriptOutcome::Completed {
                exit_code: Some(3),
                output_complete: true
            }
        );

        let out = std::fs::read_to_string(runner.store().output_path(&id)).unwrap();
        assert!(out.contains("out\n"));
        assert!(out.contains("err\n"));
    }

    #[tokio::test]
    async fn broken_capture_still_completes_with_partial_output() {
        let tmp = TempDir::new().unwrap();
        let (mut runner, _tx, _rx) = runner(&tmp);
        let (calls, handler) = recorder();
        let id = fingerprint("sleep 30");

        let run_id = runner.start(&id, "sleep 30", false, handler).unwrap();
        let report = CaptureReport {
            bytes_written: 5,
            stream_error: Some("No space left on device".to_string()),
            exit_code: Some(0),
        };
        assert!(fire(runner.finish(&id, run_id, report)));

        assert_eq!(
            calls.lock().unwrap().as_slice(),
            &[(
                ScriptOutcome::Completed {
                    exit_code: Some(0),
                    output_complete: false
                },
                id
            )]
        );
    }

    #[tokio::test]
    async fn cancel_racing_exit_fires_handler_once() {
        let tmp = TempDir::new().unwrap();
        let (mut runner, _tx, mut rx) = runner(&tmp);
        let (calls, handler) = recorder();
        let id = fingerprint("true");

        runner.start(&id, "true", false, handler).unwrap();

        // The exit is already queued but not yet processed when cancel lands.
        let (exited_id, run_id, report) = next_exit(&mut rx).await;
        assert!(fire(runner.cancel(&id)));
        assert!(!fire(runner.finish(&exited_id, run_id, report)));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, ScriptOutcome::Cancelled);
    }

    #[tokio::test]
    async fn second_cancel_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let (mut runner, _tx, _rx) = runner(&tmp);
        let (calls, handler) = recorder();
        let id = fingerprint("sleep 30");

        runner.start(&id, "sleep 30", false, handler).unwrap();
        assert!(fire(runner.cancel(&id)));
        assert!(!fire(runner.cancel(&id)));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_deadline_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let (mut runner, _tx, _rx) = runner(&tmp);
        let (calls, handler) = recorder();
        let id = fingerprint("sleep 30");

        let run_id = runner.start(&id, "sleep 30", false, handler).unwrap();
        assert!(!fire(runner.time_out(&id, run_id + 1)));
        assert!(fire(runner.time_out(&id, run_id)));
        assert!(!fire(runner.time_out(&id, run_id)));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[(ScriptOutcome::TimedOut, id)]);
    }

    #[tokio::test]
    async fn spawn_failure_registers_nothing_and_drops_handler() {
        let tmp = TempDir::new().unwrap();
        let settings = RunnerSection {
            base_dir: tmp.path().to_path_buf(),
            shell: tmp.path().join("no-such-shell"),
            chunk_size: 4096,
        };
        let (tx, _rx) = mpsc::channel(4);
        let mut runner = Runner::new(&settings, Arc::new(LogOnlyDumpSink), &tx);
        let (calls, handler) = recorder();
        let id = fingerprint("true");

        let err = runner.start(&id, "true", false, handler).unwrap_err();
        assert!(matches!(err, AcfShellError::StartFailed(_)));
        assert!(!runner.is_running(&id));
        assert_eq!(runner.in_flight(), 0);
        assert!(calls.lock().unwrap().is_empty());
        // The script file was written before the spawn attempt.
        assert!(runner.store().script_path(&id).is_file());
    }

    #[tokio::test]
    async fn colliding_start_displaces_but_still_completes_both() {
        let tmp = TempDir::new().unwrap();
        let (mut runner, _tx, _rx) = runner(&tmp);
        let (first_calls, first) = recorder();
        let (second_calls, second) = recorder();
        let id = fingerprint("sleep 30");

        let first_run = runner.start(&id, "sleep 30", false, first).unwrap();
        let second_run = runner.start(&id, "sleep 30", false, second).unwrap();
        assert_ne!(first_run, second_run);
        assert_eq!(runner.in_flight(), 2);

        // Cancel by id reaches only the latest run.
        assert!(fire(runner.cancel(&id)));
        assert!(first_calls.lock().unwrap().is_empty());
        assert_eq!(second_calls.lock().unwrap().len(), 1);

        // The displaced run can still time out.
        assert!(fire(runner.time_out(&id, first_run)));
        assert_eq!(
            first_calls.lock().unwrap().as_slice(),
            &[(ScriptOutcome::TimedOut, id)]
        );
        assert_eq!(runner.in_flight(), 0);
    }

    #[tokio::test]
    async fn cancel_run_reaches_displaced_run() {
        let tmp = TempDir::new().unwrap();
        let (mut runner, _tx, _rx) = runner(&tmp);
        let (first_calls, first) = recorder();
        let (second_calls, second) = recorder();
        let id = fingerprint("sleep 30");
        let other = fingerprint("sleep 31");

        let first_run = runner.start(&id, "sleep 30", false, first).unwrap();
        let second_run = runner.start(&id, "sleep 30", false, second).unwrap();

        // The run id must belong to the named script.
        assert!(!fire(runner.cancel_run(&other, first_run)));

        let settled = runner.cancel_run(&id, first_run).unwrap();
        assert_eq!(settled.run_id, first_run);
        settled.notify();
        assert!(!fire(runner.cancel_run(&id, first_run)));

        assert_eq!(
            first_calls.lock().unwrap().as_slice(),
            &[(ScriptOutcome::Cancelled, id.clone())]
        );
        assert!(second_calls.lock().unwrap().is_empty());
        assert!(runner.is_running(&id));

        assert!(fire(runner.cancel_run(&id, second_run)));
        assert_eq!(runner.in_flight(), 0);
    }

    #[tokio::test]
    async fn shutdown_reports_every_run_cancelled() {
        let tmp = TempDir::new().unwrap();
        let (mut runner, _tx, _rx) = runner(&tmp);
        let (calls, handler_a) = recorder();
        let sink = Arc::clone(&calls);
        let handler_b: CompletionHandler = Box::new(move |outcome, id| {
            sink.lock().unwrap().push((outcome, id));
        });

        runner.start(&fingerprint("sleep 30"), "sleep 30", false, handler_a).unwrap();
        runner.start(&fingerprint("sleep 31"), "sleep 31", false, handler_b).unwrap();
        let settled = runner.shutdown();
        assert_eq!(runner.in_flight(), 0);
        assert_eq!(settled.len(), 2);
        settled.into_iter().for_each(Settled::notify);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(o, _)| *o == ScriptOutcome::Cancelled));
    }
}
