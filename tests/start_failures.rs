mod common;
use crate::common::builders::{RunnerBuilder, TestEngine};
use crate::common::recording_dump::RecordingDumpSink;
use crate::common::init_tracing;

use std::error::Error;
use std::sync::Arc;

use acfshell::engine::spawn_engine;
use acfshell::errors::AcfShellError;
use acfshell::types::ScriptRequest;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn missing_shell_fails_start_without_session() -> TestResult {
    init_tracing();
    let engine = TestEngine::with_dump_sink(
        RunnerBuilder::new().shell("/nonexistent/acfshell-test-shell"),
        RecordingDumpSink::new(),
    );

    let result = engine.handle.start(ScriptRequest::new("echo never")).await;
    match result {
        Err(AcfShellError::StartFailed(msg)) => {
            assert!(msg.contains("acfshell-test-shell"), "unexpected message: {msg}");
        }
        Err(e) => panic!("Expected StartFailed, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }

    assert!(engine.handle.list_active().await?.is_empty());
    assert!(engine.handle.watch_active().borrow().is_empty());
    Ok(())
}

#[tokio::test]
async fn unwritable_base_dir_fails_start() -> TestResult {
    init_tracing();
    let (mut settings, dir) = RunnerBuilder::new().build();

    // A regular file where the base directory should be.
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x")?;
    settings.base_dir = blocker;

    let (handle, _join) = spawn_engine(&settings, Arc::new(RecordingDumpSink::new()));
    let result = handle.start_script("echo never", 5, false).await;

    assert!(matches!(result, Err(AcfShellError::StartFailed(_))));
    assert!(handle.list_active().await?.is_empty());

    // A failed start leaves the engine usable.
    assert!(!handle.cancel(&acfshell::store::fingerprint("echo never")).await?);
    Ok(())
}
