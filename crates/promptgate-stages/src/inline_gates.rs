use crate::services::PipelineServices;
use promptgate_core::{ExecutionContext, ExecutionStrategy, Stage, StageError, StageFlow};
use std::sync::Arc;

/// Registers the command's inline gates under the request scope.
///
/// The registrations are released by a cleanup handler whatever happens to
/// the rest of the pipeline.
pub struct RegisterInlineGatesStage {
    services: Arc<PipelineServices>,
}

impl RegisterInlineGatesStage {
    pub fn new(services: Arc<PipelineServices>) -> Self {
        Self { services }
    }
}

impl Stage for RegisterInlineGatesStage {
    fn id(&self) -> &'static str {
        "gates.inline"
    }

    fn description(&self) -> &'static str {
        "Register ad-hoc gates declared on the command for this execution"
    }

    fn should_run(&self, ctx: &ExecutionContext) -> bool {
        !ctx.command().inline_gates.is_empty()
    }

    fn run(&self, ctx: &mut ExecutionContext) -> Result<StageFlow, StageError> {
        let scope = ctx
            .scope_id()
            .map(str::to_string)
            .ok_or(StageError::MissingPrerequisite { field: "scope_id", required_by: self.id() })?;
        if ctx.plan.is_none() {
            return Err(StageError::MissingPrerequisite { field: "plan", required_by: self.id() });
        }

        let registry = &self.services.registry;
        let ids: Vec<String> = ctx
            .command()
            .inline_gates
            .iter()
            .map(|gate| registry.register_temporary(&scope, gate))
            .collect();

        let cleanup_registry = Arc::clone(registry);
        let cleanup_scope = scope.clone();
        ctx.register_cleanup("release inline gates", move || {
            cleanup_registry.cleanup_scope(&cleanup_scope);
            Ok(())
        });

        let step = ctx.step.step_number;
        if let Some(plan) = ctx.plan.as_mut() {
            let gates = match plan.strategy {
                ExecutionStrategy::Single => &mut plan.gates,
                ExecutionStrategy::Chain => plan.step_gates.entry(step).or_default(),
            };
            for id in &ids {
                if !gates.contains(id) {
                    gates.push(id.clone());
                }
            }
            plan.requires_session = true;
        }

        tracing::debug!(scope_id = %scope, gates = ?ids, "inline gates registered");
        Ok(StageFlow::Continue)
    }
}
