// src/lib.rs

pub mod cli;
pub mod config;
pub mod control;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod session;
pub mod store;
pub mod types;

use std::path::Path;
use std::pin::pin;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing::{debug, info};

use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, load_or_default};
use crate::engine::{StartedScript, spawn_engine};
use crate::exec::dump_sink_from_config;
use crate::store::{ScriptStore, fingerprint};
use crate::types::ScriptRequest;

pub use crate::engine::ShellHandle;
pub use crate::types::{ScriptId, ScriptOutcome};

/// High-level entry point used by `main.rs`.
///
/// This wires together config loading, the script engine and the chosen
/// front end (one-shot run or the stdin/stdout control protocol), plus
/// Ctrl-C handling.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_or_default(args.config.as_deref())?;

    match args.command {
        Command::Hash { script, file } => {
            let text = script_text(&script, file)?;
            println!("{}", fingerprint(&text));
            Ok(())
        }
        Command::Run {
            script,
            file,
            timeout,
            dump,
            dry_run,
        } => {
            let text = script_text(&script, file)?;
            let request = ScriptRequest::new(text).with_timeout(timeout).with_dump(dump);
            if dry_run {
                print_dry_run(&cfg, &request);
                return Ok(());
            }
            run_once(&cfg, request).await
        }
        Command::Serve => serve_stdio(&cfg).await,
    }
}

/// Start one script, wait for its outcome, and print a short summary.
/// Ctrl-C cancels the script.
async fn run_once(cfg: &ConfigFile, request: ScriptRequest) -> Result<()> {
    let (handle, engine) = spawn_engine(&cfg.runner, dump_sink_from_config(&cfg.dump));

    let StartedScript {
        id,
        output_path,
        completion,
        ..
    } = handle.start(request).await?;
    info!(id = %id, output = ?output_path, "script running");

    let mut outcome = pin!(completion.outcome());
    let outcome = tokio::select! {
        res = &mut outcome => res?,
        res = tokio::signal::ctrl_c() => {
            res.context("listening for Ctrl+C")?;
            info!(id = %id, "Ctrl+C received; cancelling script");
            handle.cancel(&id).await?;
            outcome.await?
        }
    };

    println!("id: {id}");
    println!("outcome: {outcome}");
    println!("output: {}", output_path.display());

    handle.shutdown().await?;
    engine.await.context("joining script engine")?;
    Ok(())
}

/// Run the control protocol on stdin/stdout until EOF, `quit` or Ctrl-C.
async fn serve_stdio(cfg: &ConfigFile) -> Result<()> {
    let (handle, engine) = spawn_engine(&cfg.runner, dump_sink_from_config(&cfg.dump));
    info!(base_dir = ?cfg.runner.base_dir, "serving control protocol on stdin/stdout");

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    tokio::select! {
        res = control::serve(handle.clone(), stdin, stdout) => {
            res?;
        }
        res = tokio::signal::ctrl_c() => {
            res.context("listening for Ctrl+C")?;
            info!("Ctrl+C received; stopping");
            handle.shutdown().await?;
        }
    }

    engine.await.context("joining script engine")?;
    Ok(())
}

fn script_text(script: &str, from_file: bool) -> Result<String> {
    if !from_file {
        return Ok(script.to_string());
    }
    let path = Path::new(script);
    std::fs::read_to_string(path).with_context(|| format!("reading script file {:?}", path))
}

/// Dry-run output: where the script would go and how it would be run.
fn print_dry_run(cfg: &ConfigFile, request: &ScriptRequest) {
    let store = ScriptStore::new(&cfg.runner.base_dir);
    let id = fingerprint(&request.text);

    println!("acfshell dry-run");
    println!("  runner.base_dir = {}", cfg.runner.base_dir.display());
    println!("  runner.shell = {}", cfg.runner.shell.display());
    println!("  runner.chunk_size = {}", cfg.runner.chunk_size);
    println!();
    println!("script {id}:");
    println!("  script: {}", store.script_path(&id).display());
    println!("  output: {}", store.output_path(&id).display());
    if request.timeout_secs > 0 {
        println!("  timeout: {}s", request.timeout_secs);
    } else {
        println!("  timeout: none");
    }
    if request.capture_dump {
        match &cfg.dump.command {
            Some(cmd) => println!("  dump: {cmd}"),
            None => println!("  dump: requested (no command configured)"),
        }
    }

    debug!("dry-run complete (no execution)");
}
