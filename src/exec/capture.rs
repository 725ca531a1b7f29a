// src/exec/capture.rs

//! Per-run capture task: drains the child's output into its `.out` file,
//! waits for the exit status, and reports back to the engine loop.

use std::io;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::engine::EngineMessage;
use crate::types::{RunId, ScriptId};

/// What the capture task observed for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureReport {
    /// Bytes appended to the output file.
    pub bytes_written: u64,
    /// First read/write error, if capture stopped early.
    pub stream_error: Option<String>,
    /// Process exit code; `None` if killed by a signal or not observable.
    pub exit_code: Option<i32>,
}

impl CaptureReport {
    pub fn output_complete(&self) -> bool {
        self.stream_error.is_none()
    }
}

/// Everything the capture task needs, moved in at spawn time.
pub(crate) struct CaptureJob {
    pub id: ScriptId,
    pub run_id: RunId,
    pub child: Child,
    pub output: File,
    pub chunk_size: usize,
    pub events: mpsc::Sender<EngineMessage>,
    pub kill_rx: oneshot::Receiver<()>,
}

/// Run the capture task to completion.
///
/// - Natural end: both streams hit EOF (or capture fails), the file is
///   flushed and closed, the exit status is collected, and
///   `EngineMessage::ScriptExited` is sent.
/// - Kill signal: the child is killed and reaped and **no** message is
///   sent; the runner has already reported the outcome.
/// - Kill sender dropped (runner torn down): the child is dropped, which
///   kills it because of `kill_on_drop(true)`.
pub(crate) async fn run_capture(job: CaptureJob) {
    let CaptureJob {
        id,
        run_id,
        mut child,
        output,
        chunk_size,
        events,
        mut kill_rx,
    } = job;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    tokio::select! {
        report = async {
            let mut report = drain_output(&id, stdout, stderr, output, chunk_size).await;
            report.exit_code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(id = %id, run_id, error = %e, "failed to collect exit status");
                    None
                }
            };
            report
        } => {
            info!(
                id = %id,
                run_id,
                exit_code = ?report.exit_code,
                bytes = report.bytes_written,
                "script process exited"
            );
            if events
                .send(EngineMessage::ScriptExited { id: id.clone(), run_id, report })
                .await
                .is_err()
            {
                debug!(id = %id, run_id, "engine gone before exit could be reported");
            }
        }

        kill = &mut kill_rx => {
            match kill {
                Ok(()) => {
                    info!(id = %id, run_id, "terminating script process");
                    if let Err(e) = child.kill().await {
                        warn!(id = %id, run_id, error = %e, "failed to kill script process");
                    }
                }
                Err(_) => {
                    debug!(id = %id, run_id, "runner dropped; script process killed on drop");
                }
            }
        }
    }
}

/// Copy stdout and stderr into `output` chunk by chunk, in arrival order,
/// until both streams are closed or an I/O error occurs.
async fn drain_output<O, E, W>(
    id: &ScriptId,
    mut stdout: Option<O>,
    mut stderr: Option<E>,
    mut output: W,
    chunk_size: usize,
) -> CaptureReport
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut report = CaptureReport::default();
    let mut out_buf = vec![0u8; chunk_size];
    let mut err_buf = vec![0u8; chunk_size];

    while stdout.is_some() || stderr.is_some() {
        let (res, from_stdout) = tokio::select! {
            res = read_chunk(&mut stdout, &mut out_buf), if stdout.is_some() => (res, true),
            res = read_chunk(&mut stderr, &mut err_buf), if stderr.is_some() => (res, false),
        };

        let n = match res {
            // EOF on this stream: the normal end-of-script signal.
            Ok(0) => {
                if from_stdout {
                    stdout = None;
                } else {
                    stderr = None;
                }
                continue;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(id = %id, error = %e, "error reading script output; stopping capture");
                report.stream_error = Some(e.to_string());
                break;
            }
        };

        let chunk = if from_stdout { &out_buf[..n] } else { &err_buf[..n] };
        if let Err(e) = output.write_all(chunk).await {
            warn!(id = %id, error = %e, "error writing script output; stopping capture");
            report.stream_error = Some(e.to_string());
            break;
        }
        report.bytes_written += n as u64;
    }

    if let Err(e) = output.flush().await {
        warn!(id = %id, error = %e, "error flushing script output");
        report.stream_error.get_or_insert_with(|| e.to_string());
    }

    report
}

async fn read_chunk<R>(reader: &mut Option<R>, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match reader {
        Some(r) => r.read(buf).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fingerprint;
    use std::pin::Pin;
    use std::process::Stdio;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::ReadBuf;

    /// A stream that fails on first read.
    struct ResetStream;

    impl AsyncRead for ResetStream {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "stream reset",
            )))
        }
    }

    /// A sink that rejects every write.
    struct FullDisk;

    impl AsyncWrite for FullDisk {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::other("no space left on device")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn drains_both_streams_in_chunks() {
        let id = fingerprint("x");
        let mut out = Vec::new();

        let report = drain_output(&id, Some(&b"hello\n"[..]), Some(&b""[..]), &mut out, 2).await;

        assert_eq!(report.stream_error, None);
        assert_eq!(report.bytes_written, 6);
        assert_eq!(out, b"hello\n");
    }

    #[tokio::test]
    async fn read_error_stops_capture() {
        let id = fingerprint("x");
        let mut out = Vec::new();

        let report = drain_output(&id, Some(&b"partial\n"[..]), Some(ResetStream), &mut out, 64).await;

        assert!(report.stream_error.as_deref().is_some_and(|e| e.contains("stream reset")));
        assert!(!report.output_complete());
        // Whatever was read before the failure is kept.
        assert!(b"partial\n".starts_with(&out));
        assert_eq!(report.bytes_written, out.len() as u64);
    }

    #[tokio::test]
    async fn write_error_stops_capture() {
        let id = fingerprint("x");

        let report = drain_output(&id, Some(&b"data"[..]), None::<&[u8]>, FullDisk, 64).await;

        assert!(report.stream_error.is_some());
        assert_eq!(report.bytes_written, 0);
    }

    #[tokio::test]
    async fn unwritable_output_still_reports_exit() {
        let tmp = tempfile::tempdir().unwrap();
        let out_path = tmp.path().join("out");
        std::fs::write(&out_path, "").unwrap();
        // Read-only handle: every write fails.
        let output = File::open(&out_path).await.unwrap();

        let child = tokio::process::Command::new("/bin/sh")
            .arg("-c")
            .arg("echo hi")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        let (events, mut rx) = mpsc::channel(4);
        let (_kill_tx, kill_rx) = oneshot::channel();
        let id = fingerprint("echo hi");
        tokio::spawn(run_capture(CaptureJob {
            id: id.clone(),
            run_id: 9,
            child,
            output,
            chunk_size: 64,
            events,
            kill_rx,
        }));

        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for exit")
            .expect("channel closed");
        match msg {
            EngineMessage::ScriptExited { id: got, run_id, report } => {
                assert_eq!((got, run_id), (id, 9));
                assert!(report.stream_error.is_some());
                assert_eq!(report.exit_code, Some(0));
            }
            other => panic!("expected ScriptExited, got {other:?}"),
        }
        assert_eq!(std::fs::read_to_string(&out_path).unwrap(), "");
    }
}
