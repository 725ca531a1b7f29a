// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`launcher`] spawns a script file through the configured shell.
//! - [`capture`] is the per-run task that streams stdout/stderr into the
//!   output file and reports the exit back to the engine loop.
//! - [`runner`] owns the live-process table and the exactly-once
//!   completion contract.
//! - [`dump`] provides the `DumpSink` trait used for diagnostic-dump
//!   requests, with a command-based production implementation.

pub mod capture;
pub mod dump;
pub mod launcher;
pub mod runner;

pub use capture::CaptureReport;
pub use dump::{CommandDumpSink, DumpSink, LogOnlyDumpSink, dump_sink_from_config};
pub use launcher::ShellLauncher;
pub use runner::{Runner, Settled};
