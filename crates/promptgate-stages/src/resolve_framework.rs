use crate::compose_response::build_response;
use crate::services::PipelineServices;
use promptgate_core::{ExecutionContext, ResponseStatus, Stage, StageError, StageFlow};
use promptgate_policy::FrameworkDecisionInput;
use std::sync::Arc;

/// Resolves the framework, or opens a judge phase when one is requested
pub struct ResolveFrameworkStage {
    services: Arc<PipelineServices>,
}

impl ResolveFrameworkStage {
    pub fn new(services: Arc<PipelineServices>) -> Self {
        Self { services }
    }

    fn selection_menu(&self) -> String {
        let config = &self.services.config;
        let mut lines = vec!["Select the resources for this prompt and resend with a client selection.".to_string()];
        if !config.frameworks.available.is_empty() {
            lines.push(format!("Frameworks: {}", config.frameworks.available.join(", ")));
        }
        if !config.styles.is_empty() {
            lines.push(format!("Styles: {}", config.styles.keys().cloned().collect::<Vec<_>>().join(", ")));
        }
        let gates = self.services.registry.ids();
        if !gates.is_empty() {
            lines.push(format!("Gates: {}", gates.join(", ")));
        }
        lines.join("\n")
    }
}

impl Stage for ResolveFrameworkStage {
    fn id(&self) -> &'static str {
        "framework.resolve"
    }

    fn description(&self) -> &'static str {
        "Decide whether and which framework applies"
    }

    fn run(&self, ctx: &mut ExecutionContext) -> Result<StageFlow, StageError> {
        if ctx.command().modifiers.judge && ctx.client_selection.is_none() {
            let response = build_response(ctx, &self.services, ResponseStatus::AwaitingSelection, self.selection_menu());
            ctx.response = Some(response);
            return Ok(StageFlow::Complete);
        }

        let input = FrameworkDecisionInput::from_context(ctx, self.services.config.frameworks.clone());
        self.services.frameworks.decide(ctx, &input);
        Ok(StageFlow::Continue)
    }
}
