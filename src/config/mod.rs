// src/config/mod.rs

//! Configuration loading and validation for acfshell.
//!
//! - [`model`]: the TOML-backed data model.
//! - [`loader`]: reading a config file, or falling back to defaults.
//! - [`validate`]: checks applied when turning a raw file into a `ConfigFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_or_default};
pub use model::{ConfigFile, DumpSection, RawConfigFile, RunnerSection};
pub use validate::validate_config;
