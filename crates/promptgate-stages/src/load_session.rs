use crate::services::PipelineServices;
use promptgate_core::{
    DiagnosticLevel, ExecutionContext, ExecutionStrategy, GateStatus, ReviewStatus, Stage, StageError, StageFlow,
};
use std::sync::Arc;

/// Rehydrates a pending gate review for the session
pub struct LoadSessionStage {
    services: Arc<PipelineServices>,
}

impl LoadSessionStage {
    pub fn new(services: Arc<PipelineServices>) -> Self {
        Self { services }
    }
}

impl Stage for LoadSessionStage {
    fn id(&self) -> &'static str {
        "session.load"
    }

    fn description(&self) -> &'static str {
        "Load the pending gate review keyed by session id"
    }

    fn should_run(&self, ctx: &ExecutionContext) -> bool {
        ctx.plan.as_ref().is_some_and(|p| p.requires_session) || ctx.session_id.is_some()
    }

    fn run(&self, ctx: &mut ExecutionContext) -> Result<StageFlow, StageError> {
        // sessions without a client id are keyed by the scope
        if ctx.session_id.is_none() {
            ctx.session_id = ctx.scope_id().map(str::to_string);
        }
        let session_id = ctx
            .session_id
            .clone()
            .ok_or(StageError::MissingPrerequisite { field: "scope_id", required_by: self.id() })?;

        let review = self
            .services
            .sessions
            .load(&session_id)
            .map_err(|e| StageError::Collaborator(e.to_string()))?;

        let Some(review) = review else {
            if ctx.command().gate_verdict.is_some() {
                ctx.diagnose_code(
                    DiagnosticLevel::Warning,
                    "GATE_VERDICT_UNEXPECTED",
                    format!("verdict supplied but session {} has no pending review", session_id),
                );
            }
            return Ok(StageFlow::Continue);
        };

        // a resume-only command continues the reviewed step
        if ctx.command().prompt_id.is_none() {
            ctx.step.step_number = review.step_number;
            ctx.step.total_steps = ctx.step.total_steps.max(review.step_number);
            if let Some(plan) = ctx.plan.as_mut() {
                if plan.strategy == ExecutionStrategy::Single && plan.gates.is_empty() {
                    plan.gates = review.gate_ids.clone();
                }
            }
        }

        if review.step_number == ctx.step.step_number {
            ctx.step.gate_status = match review.status {
                ReviewStatus::Resolved => GateStatus::None,
                _ if !review.feedback.is_empty() => GateStatus::Failed,
                _ => GateStatus::Pending,
            };
        }

        tracing::debug!(
            session_id = %session_id,
            status = %review.status,
            retry = review.retry_count,
            "pending review loaded"
        );
        ctx.pending_review = Some(review);
        Ok(StageFlow::Continue)
    }
}
