#![allow(dead_code)]

pub use acfshell_test_utils::builders;
pub use acfshell_test_utils::recording_dump;
pub use acfshell_test_utils::{init_tracing, with_timeout};

use std::path::Path;

/// Read a captured output file as UTF-8.
pub fn read_output(path: &Path) -> String {
    std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("reading output file {path:?}: {e}"))
}
