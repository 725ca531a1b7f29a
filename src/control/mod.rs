// src/control/mod.rs

//! Line-oriented control protocol.
//!
//! One request per line, one response per request:
//!
//! ```text
//! start <timeout_secs> <dump 0|1> <script text...>   ->  ok <id> | err <message>
//! cancel <id>                                        ->  ok true | ok false
//! active                                             ->  ok <id> <id> ...
//! quit                                               ->  ok bye
//! ```
//!
//! When a script started through this connection finishes, an extra line
//! `done <id> <outcome>` is written. On `quit` or end of input every script
//! still running is terminated before [`serve`] returns.

use std::str::FromStr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::ShellHandle;
use crate::errors::{AcfShellError, Result};
use crate::types::{ScriptId, ScriptRequest};

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Start {
        timeout_secs: u64,
        want_dump: bool,
        text: String,
    },
    Cancel(ScriptId),
    Active,
    Quit,
}

impl FromStr for ControlCommand {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (verb, rest) = next_token(s);
        match verb {
            "start" => {
                let (timeout, rest) = next_token(rest);
                let (dump, text) = next_token(rest);
                let timeout_secs = timeout
                    .parse::<u64>()
                    .map_err(|_| format!("invalid timeout {timeout:?} (expected seconds)"))?;
                let want_dump = parse_flag(dump)?;
                if text.is_empty() {
                    return Err("start requires script text".to_string());
                }
                Ok(ControlCommand::Start {
                    timeout_secs,
                    want_dump,
                    text: text.to_string(),
                })
            }
            "cancel" => {
                let id = rest.parse::<ScriptId>().map_err(|e| e.to_string())?;
                Ok(ControlCommand::Cancel(id))
            }
            "active" if rest.is_empty() => Ok(ControlCommand::Active),
            "quit" if rest.is_empty() => Ok(ControlCommand::Quit),
            "" => Err("empty command".to_string()),
            other => Err(format!(
                "unknown command {other:?} (expected start, cancel, active or quit)"
            )),
        }
    }
}

/// Split off the first whitespace-delimited token; the remainder keeps its
/// inner whitespace.
fn next_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim_start()),
        None => (s, ""),
    }
}

fn parse_flag(s: &str) -> std::result::Result<bool, String> {
    match s {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(format!("invalid dump flag {other:?} (expected 0 or 1)")),
    }
}

/// Serve the protocol until `quit`, end of input or a read error, then
/// terminate the engine's scripts. Returns the writer once every pending
/// line is flushed.
pub async fn serve<R, W>(handle: ShellHandle, mut reader: R, writer: W) -> Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::channel::<String>(64);
    let writer_task = tokio::spawn(write_lines(out_rx, writer));

    let mut buf = Vec::new();
    let read_result = loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break Ok(()),
            Ok(_) => {}
            Err(e) => break Err(e),
        }

        let Ok(line) = std::str::from_utf8(&buf) else {
            warn!(bytes = buf.len(), "control request is not valid UTF-8");
            let _ = out_tx.send("err request is not valid UTF-8".to_string()).await;
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match line.parse::<ControlCommand>() {
            Ok(command) => command,
            Err(e) => {
                let _ = out_tx.send(format!("err {e}")).await;
                continue;
            }
        };
        debug!(?command, "control request");

        if command == ControlCommand::Quit {
            let _ = out_tx.send("ok bye".to_string()).await;
            break Ok(());
        }

        let response = dispatch(&handle, command, &out_tx).await;
        let _ = out_tx.send(response).await;
    };

    if let Err(e) = &read_result {
        warn!(error = %e, "reading control input failed");
    }
    info!("control input finished; stopping engine");
    match handle.shutdown().await {
        Ok(()) | Err(AcfShellError::EngineStopped) => {}
        Err(e) => warn!(error = %e, "engine shutdown failed"),
    }

    drop(out_tx);
    let writer = writer_task
        .await
        .map_err(|e| AcfShellError::Other(anyhow::anyhow!("control writer task failed: {e}")))??;
    read_result?;
    Ok(writer)
}

async fn dispatch(
    handle: &ShellHandle,
    command: ControlCommand,
    out_tx: &mpsc::Sender<String>,
) -> String {
    match command {
        ControlCommand::Start {
            timeout_secs,
            want_dump,
            text,
        } => {
            let request = ScriptRequest::new(text)
                .with_timeout(timeout_secs)
                .with_dump(want_dump);
            match handle.start(request).await {
                Ok(started) => {
                    let id = started.id.clone();
                    let out = out_tx.clone();
                    tokio::spawn(async move {
                        if let Ok(outcome) = started.completion.outcome().await {
                            let _ = out.send(format!("done {} {}", started.id, outcome)).await;
                        }
                    });
                    format!("ok {id}")
                }
                Err(e) => format!("err {e}"),
            }
        }
        ControlCommand::Cancel(id) => match handle.cancel(&id).await {
            Ok(cancelled) => format!("ok {cancelled}"),
            Err(e) => format!("err {e}"),
        },
        ControlCommand::Active => match handle.list_active().await {
            Ok(ids) => {
                let mut line = String::from("ok");
                for id in ids {
                    line.push(' ');
                    line.push_str(id.as_str());
                }
                line
            }
            Err(e) => format!("err {e}"),
        },
        ControlCommand::Quit => "ok bye".to_string(),
    }
}

async fn write_lines<W>(mut rx: mpsc::Receiver<String>, mut writer: W) -> Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(writer)
}
