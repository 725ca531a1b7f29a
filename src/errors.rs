// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcfShellError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// A script could not be started (file write or spawn failed).
    /// No session exists for it.
    #[error("Could not start script: {0}")]
    StartFailed(String),

    #[error("Invalid script id: {0}")]
    InvalidScriptId(String),

    /// The engine loop is gone; no further requests can be served.
    #[error("Script engine is not running")]
    EngineStopped,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AcfShellError>;
