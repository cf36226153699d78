use crate::services::PipelineServices;
use promptgate_core::{
    ExecutionContext, GateAction, GateOutcome, PipelineResponse, ResponseStatus, Stage, StageError, StageFlow,
    StepProgress,
};
use std::sync::Arc;

/// Response skeleton carrying the request's identifiers and decisions
pub(crate) fn build_response(
    ctx: &ExecutionContext,
    services: &PipelineServices,
    status: ResponseStatus,
    content: String,
) -> PipelineResponse {
    let progress = ctx.command().is_chain().then(|| StepProgress {
        current: ctx.step.step_number,
        total: ctx.step.total_steps,
    });

    PipelineResponse {
        request_id: ctx.request_id.clone(),
        pipeline_id: String::new(),
        status,
        scope_id: ctx.scope_id().map(str::to_string),
        session_id: ctx.session_id.clone(),
        prompt_id: current_prompt_id(ctx),
        content,
        injections: ctx.injections.clone(),
        framework: ctx.framework_decision().cloned(),
        gate: ctx.gate_decision().cloned(),
        progress,
        config_fingerprint: Some(services.config_fingerprint().to_string()),
        diagnostics: Vec::new(),
        stages: Vec::new(),
    }
}

fn current_prompt_id(ctx: &ExecutionContext) -> Option<String> {
    let command = ctx.command();
    let index = ctx.step.step_number.checked_sub(1)? as usize;
    command
        .steps
        .get(index)
        .map(|s| s.prompt_id.clone())
        .or_else(|| command.prompt_id.clone())
}

/// Assembles the client-facing content and status
pub struct ComposeResponseStage {
    services: Arc<PipelineServices>,
}

impl ComposeResponseStage {
    pub fn new(services: Arc<PipelineServices>) -> Self {
        Self { services }
    }

    fn prompt_body(&self, ctx: &ExecutionContext) -> String {
        let mut sections: Vec<String> = ctx.injections.iter().map(|f| f.text.clone()).collect();

        if let Some(id) = current_prompt_id(ctx) {
            let text = self
                .services
                .config
                .prompt(&id)
                .map(|p| p.text.clone())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| format!("Execute prompt {}.", id));
            sections.push(text);
        }

        let args = ctx.command().raw_args.trim();
        if !args.is_empty() {
            sections.push(format!("Arguments: {}", args));
        }
        sections.join("\n\n")
    }

    fn continuation(&self, ctx: &ExecutionContext) -> Option<String> {
        if !ctx.command().is_chain() || ctx.step.is_last() {
            return None;
        }
        let next = StepProgress {
            current: ctx.step.step_number + 1,
            total: ctx.step.total_steps,
        };
        let session = ctx.session_id.as_deref().or(ctx.scope_id()).unwrap_or_default();
        Some(format!("Next: {}. Resume with session_id {}.", next, session))
    }

    fn step_done_status(&self, ctx: &ExecutionContext) -> ResponseStatus {
        if ctx.command().is_chain() && !ctx.step.is_last() {
            ResponseStatus::StepCompleted
        } else {
            ResponseStatus::Completed
        }
    }

    fn compose(&self, ctx: &ExecutionContext) -> (ResponseStatus, String) {
        let Some(gate) = ctx.gate_decision() else {
            return (self.step_done_status(ctx), self.with_hint(ctx, self.prompt_body(ctx)));
        };
        let review_prompt = gate.review_prompt.clone().unwrap_or_default();

        match (gate.action, gate.outcome) {
            (GateAction::AbortChain, _) => {
                let feedback = gate.feedback.clone().unwrap_or_default();
                let content = format!(
                    "Gate could not be satisfied after {} retries: {}\n{}",
                    gate.attempt,
                    gate.gate_ids.join(", "),
                    feedback
                );
                (ResponseStatus::ChainAborted, content.trim_end().to_string())
            }
            (GateAction::InjectReviewPrompt, _) => (
                ResponseStatus::AwaitingReview,
                format!("{}\n\n{}", self.prompt_body(ctx), review_prompt),
            ),
            (GateAction::RetryWithFeedback, _) => (
                ResponseStatus::RetryRequested,
                format!("{}\n\n{}", self.prompt_body(ctx), review_prompt),
            ),
            (GateAction::Continue, Some(GateOutcome::NotRequired)) | (GateAction::Continue, None) => {
                (self.step_done_status(ctx), self.with_hint(ctx, self.prompt_body(ctx)))
            }
            (GateAction::Continue, Some(outcome)) => {
                let summary = match outcome {
                    GateOutcome::Passed => "passed gate review",
                    GateOutcome::AdvisoryFailure => "failed gate review (advisory, not blocking)",
                    _ => "could not satisfy its gates and was skipped",
                };
                let subject = if ctx.command().is_chain() {
                    StepProgress {
                        current: ctx.step.step_number,
                        total: ctx.step.total_steps,
                    }
                    .to_string()
                } else {
                    "Prompt".to_string()
                };
                (
                    self.step_done_status(ctx),
                    self.with_hint(ctx, format!("{} {}.", subject, summary)),
                )
            }
        }
    }

    fn with_hint(&self, ctx: &ExecutionContext, content: String) -> String {
        match self.continuation(ctx) {
            Some(hint) => format!("{}\n\n{}", content, hint),
            None => content,
        }
    }
}

impl Stage for ComposeResponseStage {
    fn id(&self) -> &'static str {
        "response.compose"
    }

    fn description(&self) -> &'static str {
        "Compose the client-facing response"
    }

    fn run(&self, ctx: &mut ExecutionContext) -> Result<StageFlow, StageError> {
        let (status, content) = self.compose(ctx);
        let response = build_response(ctx, &self.services, status, content);
        tracing::info!(
            request_id = %ctx.request_id,
            status = ?response.status,
            injections = response.injections.len(),
            "response composed"
        );
        ctx.response = Some(response);
        Ok(StageFlow::Continue)
    }
}
