use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use acfshell::errors::Result;
use acfshell::exec::DumpSink;
use acfshell::ScriptId;
use tokio::sync::Notify;

/// A dump sink that:
/// - records every id it was asked to dump
/// - optionally fails each request, to show failures are only logged.
#[derive(Default)]
pub struct RecordingDumpSink {
    requested: Arc<Mutex<Vec<ScriptId>>>,
    notify: Notify,
    fail: bool,
}

impl RecordingDumpSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requested(&self) -> Vec<ScriptId> {
        self.requested.lock().unwrap().clone()
    }

    /// Wait until at least `n` dumps were requested.
    pub async fn wait_for(&self, n: usize) {
        loop {
            let notified = self.notify.notified();
            if self.requested.lock().unwrap().len() >= n {
                return;
            }
            notified.await;
        }
    }
}

impl DumpSink for RecordingDumpSink {
    fn create_dump(
        &self,
        id: &ScriptId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let id = id.clone();
        Box::pin(async move {
            {
                let mut guard = self.requested.lock().unwrap();
                guard.push(id.clone());
            }
            self.notify.notify_waiters();

            if self.fail {
                return Err(anyhow::anyhow!("dump manager unavailable for {id}").into());
            }
            Ok(())
        })
    }
}
