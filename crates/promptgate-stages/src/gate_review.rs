use crate::services::PipelineServices;
use promptgate_core::{
    DiagnosticLevel, ExecutionContext, GateAction, GateOutcome, GateStatus, Stage, StageError, StageFlow,
};
use promptgate_policy::{compose_review_prompt, GateDefinition, GateEnforcementInput};
use std::sync::Arc;

/// Runs the gate authority for the current step and persists the review
pub struct GateReviewStage {
    services: Arc<PipelineServices>,
}

impl GateReviewStage {
    pub fn new(services: Arc<PipelineServices>) -> Self {
        Self { services }
    }

    fn input(&self, ctx: &mut ExecutionContext) -> Result<GateEnforcementInput, StageError> {
        let plan = ctx
            .plan
            .as_ref()
            .ok_or(StageError::MissingPrerequisite { field: "plan", required_by: self.id() })?;
        let step = ctx.step.step_number;
        let gate_ids = plan.gates_for_step(step).to_vec();

        let resolved = self.services.registry.resolve(ctx.scope_id(), &gate_ids);
        let mut definitions = resolved.definitions;
        if !resolved.missing.is_empty() {
            ctx.diagnose_code(
                DiagnosticLevel::Warning,
                "GATE_UNKNOWN",
                format!("gates without a definition: {}", resolved.missing.join(", ")),
            );
            definitions.extend(resolved.missing.iter().map(GateDefinition::new));
        }

        let settings = &self.services.config.gates;
        let session_id = ctx
            .session_id
            .clone()
            .or_else(|| ctx.scope_id().map(str::to_string))
            .ok_or(StageError::MissingPrerequisite { field: "scope_id", required_by: self.id() })?;

        let mut input = GateEnforcementInput::new(session_id, gate_ids)
            .at_step(step)
            .mode(settings.enforcement_mode)
            .retry(settings.retry)
            .review(ctx.pending_review.clone())
            .review_prompt(compose_review_prompt(&definitions, step));
        input.gates_disabled = ctx.command().modifiers.disable_gates;
        input.gate_retries = definitions.iter().filter_map(|d| d.retry).collect();
        input.verdict = ctx.command().gate_verdict.clone();
        Ok(input)
    }
}

impl Stage for GateReviewStage {
    fn id(&self) -> &'static str {
        "gates.review"
    }

    fn description(&self) -> &'static str {
        "Decide the gate action for this step and persist the review"
    }

    fn run(&self, ctx: &mut ExecutionContext) -> Result<StageFlow, StageError> {
        let input = self.input(ctx)?;
        let decision = self.services.gates.decide(ctx, &input);

        let sessions = &self.services.sessions;
        match &decision.review {
            Some(review) if !review.is_resolved() => sessions
                .save(&input.session_id, review)
                .map_err(|e| StageError::Collaborator(e.to_string()))?,
            _ if input.review.is_some() => sessions
                .clear(&input.session_id)
                .map_err(|e| StageError::Collaborator(e.to_string()))?,
            _ => {}
        }

        ctx.step.gate_status = match (decision.action, decision.outcome) {
            (_, Some(GateOutcome::NotRequired)) => GateStatus::None,
            (_, Some(GateOutcome::Passed)) => GateStatus::Passed,
            (_, Some(_)) | (GateAction::RetryWithFeedback, None) => GateStatus::Failed,
            _ => GateStatus::Pending,
        };
        ctx.pending_review = decision.review;
        Ok(StageFlow::Continue)
    }
}
