// src/session/mod.rs

//! Per-script session bookkeeping.
//!
//! - [`tracker`]: the timeout guard owned by each running session.
//! - [`registry`]: the set of active sessions, keyed by script id.

pub mod registry;
pub mod tracker;

pub use registry::{ScriptSession, SessionRegistry};
pub use tracker::{LifecycleTracker, TrackerPhase};
