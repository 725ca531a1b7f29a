mod common;
use crate::common::builders::{RunnerBuilder, TestEngine};
use crate::common::recording_dump::RecordingDumpSink;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;

use acfshell::types::ScriptRequest;
use acfshell::ScriptOutcome;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn dump_requested_only_when_asked() -> TestResult {
    init_tracing();
    let engine = TestEngine::start();

    let quiet = engine
        .handle
        .start(ScriptRequest::new("echo quiet").with_timeout(5))
        .await?;
    with_timeout(quiet.completion.outcome()).await?;

    let loud = engine
        .handle
        .start(ScriptRequest::new("echo loud").with_timeout(5).with_dump(true))
        .await?;
    with_timeout(loud.completion.outcome()).await?;

    with_timeout(engine.dumps.wait_for(1)).await;
    assert_eq!(engine.dumps.requested(), vec![loud.id]);
    Ok(())
}

#[tokio::test]
async fn cancelled_script_gets_no_dump() -> TestResult {
    init_tracing();
    let engine = TestEngine::start();

    let cancelled = engine
        .handle
        .start(ScriptRequest::new("sleep 30").with_dump(true))
        .await?;
    assert!(engine.handle.cancel(&cancelled.id).await?);
    with_timeout(cancelled.completion.outcome()).await?;

    let finished = engine
        .handle
        .start(ScriptRequest::new("true").with_dump(true))
        .await?;
    with_timeout(finished.completion.outcome()).await?;

    with_timeout(engine.dumps.wait_for(1)).await;
    assert_eq!(engine.dumps.requested(), vec![finished.id]);
    Ok(())
}

#[tokio::test]
async fn failing_dump_does_not_change_outcome() -> TestResult {
    init_tracing();
    let engine = TestEngine::with_dump_sink(RunnerBuilder::new(), RecordingDumpSink::failing());

    let started = engine
        .handle
        .start(ScriptRequest::new("exit 0").with_dump(true))
        .await?;
    let outcome = with_timeout(started.completion.outcome()).await?;
    assert_eq!(
        outcome,
        ScriptOutcome::Completed {
            exit_code: Some(0),
            output_complete: true,
        }
    );

    with_timeout(engine.dumps.wait_for(1)).await;

    // The engine keeps serving after the failed dump.
    assert!(engine.handle.list_active().await?.is_empty());
    Ok(())
}
