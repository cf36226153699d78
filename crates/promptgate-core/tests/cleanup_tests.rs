//! Cleanup guarantees of the pipeline runner.
//!
//! Whatever happens inside the stages, every registered cleanup handler runs
//! exactly once, in reverse registration order.

use promptgate_core::{
    ExecutionContext, ParsedCommand, PipelineRunner, Stage, StageError, StageFlow, StageOutcome,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<&'static str>>>;

/// Registers one cleanup handler, optionally a failing one
struct Registering {
    id: &'static str,
    handler_fails: bool,
    log: Log,
    calls: Arc<AtomicUsize>,
}

impl Stage for Registering {
    fn id(&self) -> &'static str {
        self.id
    }

    fn run(&self, ctx: &mut ExecutionContext) -> Result<StageFlow, StageError> {
        let log = Arc::clone(&self.log);
        let calls = Arc::clone(&self.calls);
        let id = self.id;
        let fails = self.handler_fails;
        ctx.register_cleanup(id, move || {
            calls.fetch_add(1, Ordering::SeqCst);
            log.lock().unwrap().push(id);
            if fails {
                anyhow::bail!("release failed for {}", id);
            }
            Ok(())
        });
        Ok(StageFlow::Continue)
    }
}

struct Exploding;

impl Stage for Exploding {
    fn id(&self) -> &'static str {
        "explode.now"
    }

    fn run(&self, _ctx: &mut ExecutionContext) -> Result<StageFlow, StageError> {
        Err(StageError::ExecutionFailed("unexpected".to_string()))
    }
}

struct Panicking;

impl Stage for Panicking {
    fn id(&self) -> &'static str {
        "panic.now"
    }

    fn run(&self, _ctx: &mut ExecutionContext) -> Result<StageFlow, StageError> {
        panic!("stage bug");
    }
}

fn registering(id: &'static str, handler_fails: bool, log: &Log, calls: &Arc<AtomicUsize>) -> Box<dyn Stage> {
    Box::new(Registering {
        id,
        handler_fails,
        log: Arc::clone(log),
        calls: Arc::clone(calls),
    })
}

#[tokio::test]
async fn test_cleanup_runs_once_in_reverse_when_stage_throws() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    let runner = PipelineRunner::new(vec![
        registering("one.register", false, &log, &calls),
        registering("two.register", true, &log, &calls),
        registering("three.register", false, &log, &calls),
        Box::new(Exploding),
        registering("four.register", false, &log, &calls),
    ]);

    let err = runner
        .execute(ExecutionContext::new(ParsedCommand::single("p")))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), "explode.now");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["three.register", "two.register", "one.register"]
    );
    assert!(err
        .diagnostics()
        .iter()
        .any(|d| d.code.as_deref() == Some("CLEANUP_FAILED")));
    assert_eq!(err.metrics().len(), 4);
}

#[tokio::test]
async fn test_panicking_stage_is_reported_and_cleaned_up() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    let runner = PipelineRunner::new(vec![registering("one.register", false, &log, &calls), Box::new(Panicking)]);

    let err = runner
        .execute(ExecutionContext::new(ParsedCommand::single("p")))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), "panic.now");
    assert_eq!(err.metrics().last().unwrap().outcome, StageOutcome::Failed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cleanup_runs_on_success() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    let runner = PipelineRunner::new(vec![
        registering("one.register", true, &log, &calls),
        registering("two.register", false, &log, &calls),
    ]);

    let response = runner
        .execute(ExecutionContext::new(ParsedCommand::single("p")))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*log.lock().unwrap(), vec!["two.register", "one.register"]);
    assert!(response.stages.iter().all(|m| m.outcome == StageOutcome::Completed));
}
