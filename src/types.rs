// src/types.rs

//! Core data model shared by the store, runner, sessions and engine.

use std::fmt;
use std::str::FromStr;

use crate::errors::AcfShellError;

/// Number of hex characters kept from the content digest (128 bits).
pub const SCRIPT_ID_LEN: usize = 32;

/// Content-derived identifier of a script.
///
/// Always `SCRIPT_ID_LEN` lowercase hex characters. Values coming from
/// outside the process go through [`FromStr`], which rejects anything else,
/// so an id can safely be used as a path component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScriptId(String);

impl ScriptId {
    /// Wrap an already-validated digest. Only the fingerprint function
    /// builds ids this way.
    pub(crate) fn from_digest(hex: &str) -> Self {
        Self(hex[..SCRIPT_ID_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ScriptId {
    type Err = AcfShellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let well_formed = s.len() == SCRIPT_ID_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(AcfShellError::InvalidScriptId(format!(
                "expected {SCRIPT_ID_LEN} lowercase hex characters, got {s:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

/// Per-engine sequence number of a successful spawn.
///
/// Two runs of the same script text share a `ScriptId` but never a `RunId`.
pub type RunId = u64;

/// Input to a start operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRequest {
    /// Script source, handed to the shell as a file.
    pub text: String,
    /// Seconds before the script is force-terminated; 0 disables the timeout.
    pub timeout_secs: u64,
    /// Request a diagnostic dump when the script completes on its own.
    pub capture_dump: bool,
}

impl ScriptRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timeout_secs: 0,
            capture_dump: false,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_dump(mut self, capture_dump: bool) -> Self {
        self.capture_dump = capture_dump;
        self
    }
}

/// How a session reached its terminal state.
///
/// None of these is an error: cancellation and timeouts are reported
/// through the same channel as a natural exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// The process exited on its own.
    Completed {
        /// `None` when the process was ended by a signal.
        exit_code: Option<i32>,
        /// `false` if output capture stopped early on an I/O error.
        output_complete: bool,
    },
    /// Cancelled by a caller, or by engine shutdown.
    Cancelled,
    /// The timeout elapsed before the process exited.
    TimedOut,
}

impl fmt::Display for ScriptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptOutcome::Completed {
                exit_code,
                output_complete,
            } => {
                match exit_code {
                    Some(code) => write!(f, "completed exit={code}")?,
                    None => f.write_str("completed exit=signal")?,
                }
                if !output_complete {
                    f.write_str(" output=partial")?;
                }
                Ok(())
            }
            ScriptOutcome::Cancelled => f.write_str("cancelled"),
            ScriptOutcome::TimedOut => f.write_str("timed-out"),
        }
    }
}

/// Callback invoked exactly once when a started script reaches a terminal
/// state.
pub type CompletionHandler = Box<dyn FnOnce(ScriptOutcome, ScriptId) + Send>;
