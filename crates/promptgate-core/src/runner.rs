//! Pipeline Runner: runs stages in order, records metrics, always cleans up
use crate::context::ExecutionContext;
use crate::data_model::{PipelineResponse, ResponseStatus};
use crate::diagnostics::{DiagnosticEntry, DiagnosticLevel};
use crate::stage::{Stage, StageError, StageFlow};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageOutcome {
    Completed,
    /// Finished the response early; later stages were skipped
    Halted,
    Skipped,
    Failed,
}

/// Entry/exit record of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMetric {
    pub stage: String,
    pub outcome: StageOutcome,
    pub duration_ms: f64,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("STAGE/{stage}: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: StageError,
        diagnostics: Vec<DiagnosticEntry>,
        metrics: Vec<StageMetric>,
    },
}

impl PipelineError {
    pub fn stage(&self) -> &str {
        match self {
            PipelineError::StageFailed { stage, .. } => stage,
        }
    }

    pub fn metrics(&self) -> &[StageMetric] {
        match self {
            PipelineError::StageFailed { metrics, .. } => metrics,
        }
    }

    pub fn diagnostics(&self) -> &[DiagnosticEntry] {
        match self {
            PipelineError::StageFailed { diagnostics, .. } => diagnostics,
        }
    }
}

struct StageFailure {
    stage: String,
    error: StageError,
    metrics: Vec<StageMetric>,
}

pub struct PipelineRunner {
    stages: Vec<Box<dyn Stage>>,
    pipeline_id: String,
}

impl PipelineRunner {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        let pipeline_id = Self::compute_id(&stages);
        Self { stages, pipeline_id }
    }

    /// Append a stage
    pub fn add_stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self.pipeline_id = Self::compute_id(&self.stages);
        self
    }

    fn compute_id(stages: &[Box<dyn Stage>]) -> String {
        stages
            .iter()
            .map(|s| s.id().split('.').next().unwrap_or("?"))
            .collect::<Vec<_>>()
            .join("→")
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// Look up a stage by id (diagnostics and tests)
    pub fn get_stage(&self, id: &str) -> Option<&dyn Stage> {
        self.stages.iter().find(|s| s.id() == id).map(|s| s.as_ref())
    }

    pub fn stage_ids(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage against a fresh context and produce the response.
    ///
    /// A failing stage halts the remaining stages. Cleanup handlers run on
    /// every exit path before the result is returned, and stage errors are
    /// handed back to the caller rather than swallowed.
    pub async fn execute(&self, mut ctx: ExecutionContext) -> Result<PipelineResponse, PipelineError> {
        let result = self.run_stages(&mut ctx).await;
        let cleanup_failures = ctx.run_cleanup();
        if cleanup_failures > 0 {
            tracing::warn!(request_id = %ctx.request_id, cleanup_failures, "cleanup finished with failures");
        }

        match result {
            Ok(metrics) => Ok(self.finish(ctx, metrics)),
            Err(failure) => Err(PipelineError::StageFailed {
                stage: failure.stage,
                source: failure.error,
                diagnostics: ctx.take_diagnostics().into_entries(),
                metrics: failure.metrics,
            }),
        }
    }

    async fn run_stages(&self, ctx: &mut ExecutionContext) -> Result<Vec<StageMetric>, StageFailure> {
        let mut metrics = Vec::with_capacity(self.stages.len());
        let mut halted = false;

        for stage in &self.stages {
            let id = stage.id();
            if halted || !stage.should_run(ctx) {
                metrics.push(StageMetric {
                    stage: id.to_string(),
                    outcome: StageOutcome::Skipped,
                    duration_ms: 0.0,
                });
                continue;
            }

            tracing::debug!(stage = id, request_id = %ctx.request_id, "entering stage");
            ctx.enter_stage(id);
            let start = Instant::now();
            let result = catch_unwind(AssertUnwindSafe(|| stage.run(ctx)))
                .unwrap_or_else(|_| Err(StageError::ExecutionFailed(format!("stage {} panicked", id))));
            let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

            match result {
                Ok(flow) => {
                    ctx.exit_stage();
                    halted = flow == StageFlow::Complete;
                    metrics.push(StageMetric {
                        stage: id.to_string(),
                        outcome: if halted { StageOutcome::Halted } else { StageOutcome::Completed },
                        duration_ms,
                    });
                }
                Err(error) => {
                    tracing::error!(stage = id, request_id = %ctx.request_id, error = %error, "stage failed");
                    ctx.diagnose_code(DiagnosticLevel::Error, "STAGE_FAILED", error.to_string());
                    ctx.exit_stage();
                    metrics.push(StageMetric {
                        stage: id.to_string(),
                        outcome: StageOutcome::Failed,
                        duration_ms,
                    });
                    return Err(StageFailure {
                        stage: id.to_string(),
                        error,
                        metrics,
                    });
                }
            }

            tokio::task::yield_now().await;
        }

        Ok(metrics)
    }

    fn finish(&self, mut ctx: ExecutionContext, metrics: Vec<StageMetric>) -> PipelineResponse {
        let diagnostics = ctx.take_diagnostics().into_entries();
        let mut response = match ctx.response.take() {
            Some(response) => response,
            None => PipelineResponse {
                request_id: ctx.request_id.clone(),
                pipeline_id: String::new(),
                status: ResponseStatus::Completed,
                scope_id: ctx.scope_id().map(str::to_string),
                session_id: ctx.session_id.clone(),
                prompt_id: ctx.command().prompt_id.clone(),
                content: String::new(),
                injections: ctx.injections.clone(),
                framework: ctx.framework_decision().cloned(),
                gate: ctx.gate_decision().cloned(),
                progress: None,
                config_fingerprint: None,
                diagnostics: Vec::new(),
                stages: Vec::new(),
            },
        };
        response.pipeline_id = self.pipeline_id.clone();
        response.diagnostics = diagnostics;
        response.stages = metrics;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ParsedCommand;
    use std::sync::{Arc, Mutex};

    struct Recording {
        id: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
        flow: StageFlow,
    }

    impl Stage for Recording {
        fn id(&self) -> &'static str {
            self.id
        }

        fn run(&self, ctx: &mut ExecutionContext) -> Result<StageFlow, StageError> {
            self.log.lock().unwrap().push(format!("run:{}", self.id));
            let log = Arc::clone(&self.log);
            let id = self.id;
            ctx.register_cleanup(id, move || {
                log.lock().unwrap().push(format!("cleanup:{}", id));
                Ok(())
            });
            ctx.diagnose(DiagnosticLevel::Info, "ran");
            if self.fail {
                return Err(StageError::ExecutionFailed("boom".to_string()));
            }
            Ok(self.flow)
        }
    }

    fn stage(id: &'static str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Box<dyn Stage> {
        Box::new(Recording {
            id,
            log: Arc::clone(log),
            fail,
            flow: StageFlow::Continue,
        })
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runner = PipelineRunner::new(vec![stage("a.one", &log, false), stage("b.two", &log, false)]);
        let response = runner
            .execute(ExecutionContext::new(ParsedCommand::single("p")))
            .await
            .unwrap();

        assert_eq!(runner.pipeline_id(), "a→b");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["run:a.one", "run:b.two", "cleanup:b.two", "cleanup:a.one"]
        );
        assert_eq!(response.stages.len(), 2);
        assert_eq!(response.diagnostics[0].stage, "a.one");
        assert_eq!(response.diagnostics[1].stage, "b.two");
    }

    #[tokio::test]
    async fn test_failure_halts_and_still_cleans_up() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runner = PipelineRunner::new(vec![
            stage("a.one", &log, false),
            stage("b.two", &log, true),
            stage("c.three", &log, false),
        ]);
        let err = runner
            .execute(ExecutionContext::new(ParsedCommand::single("p")))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), "b.two");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["run:a.one", "run:b.two", "cleanup:b.two", "cleanup:a.one"]
        );
        assert_eq!(err.metrics().last().unwrap().outcome, StageOutcome::Failed);
        assert!(err.diagnostics().iter().any(|d| d.code.as_deref() == Some("STAGE_FAILED")));
    }

    #[tokio::test]
    async fn test_complete_skips_remaining() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runner = PipelineRunner::new(vec![
            Box::new(Recording {
                id: "a.one",
                log: Arc::clone(&log),
                fail: false,
                flow: StageFlow::Complete,
            }),
            stage("b.two", &log, false),
        ]);
        let response = runner
            .execute(ExecutionContext::new(ParsedCommand::single("p")))
            .await
            .unwrap();

        assert_eq!(response.stages[0].outcome, StageOutcome::Halted);
        assert_eq!(response.stages[1].outcome, StageOutcome::Skipped);
        assert!(!log.lock().unwrap().contains(&"run:b.two".to_string()));
    }

    #[test]
    fn test_get_stage() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runner = PipelineRunner::new(vec![stage("a.one", &log, false)]);
        assert!(runner.get_stage("a.one").is_some());
        assert!(runner.get_stage("missing").is_none());
    }
}
