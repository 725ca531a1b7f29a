// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `acfshell`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "acfshell",
    version,
    about = "Run administrative shell scripts with timeouts, cancellation and captured output.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Acfshell.toml` in the current directory if it exists,
    /// otherwise built-in defaults.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ACFSHELL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run one script, wait for it and print its outcome.
    Run {
        /// Script text, or a path to a script file with `--file`.
        script: String,

        /// Treat SCRIPT as a path and run the file's contents.
        #[arg(long)]
        file: bool,

        /// Seconds before the script is killed (0 = no timeout).
        #[arg(long, value_name = "SECS", default_value_t = 30)]
        timeout: u64,

        /// Request a diagnostic dump when the script completes.
        #[arg(long)]
        dump: bool,

        /// Print the id and file locations, but don't execute anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Serve the line-based control protocol on stdin/stdout.
    Serve,

    /// Print the identifier a script would get.
    Hash {
        /// Script text, or a path to a script file with `--file`.
        script: String,

        /// Treat SCRIPT as a path and hash the file's contents.
        #[arg(long)]
        file: bool,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults_to_thirty_second_timeout() {
        let args = CliArgs::try_parse_from(["acfshell", "run", "echo hi"]).unwrap();
        match args.command {
            Command::Run {
                script,
                timeout,
                dump,
                file,
                dry_run,
            } => {
                assert_eq!(script, "echo hi");
                assert_eq!(timeout, 30);
                assert!(!dump && !file && !dry_run);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = CliArgs::try_parse_from([
            "acfshell",
            "serve",
            "--config",
            "/etc/acfshell.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert!(matches!(args.command, Command::Serve));
        assert_eq!(args.config, Some(PathBuf::from("/etc/acfshell.toml")));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }
}
