use crate::services::PipelineServices;
use promptgate_core::{DiagnosticLevel, ExecutionContext, InjectedFragment, InjectionType, Stage, StageError, StageFlow};
use std::sync::Arc;

/// Consults the injection service for every type and collects fragments
pub struct ResolveInjectionStage {
    services: Arc<PipelineServices>,
}

impl ResolveInjectionStage {
    pub fn new(services: Arc<PipelineServices>) -> Self {
        Self { services }
    }

    fn fragment(&self, ctx: &ExecutionContext, injection_type: InjectionType) -> Option<String> {
        let config = &self.services.config;
        match injection_type {
            InjectionType::SystemPrompt => {
                let decision = ctx.framework_decision().filter(|d| d.should_apply)?;
                let id = decision.framework_id.as_deref()?;
                Some(
                    config
                        .framework_prompts
                        .get(id)
                        .cloned()
                        .unwrap_or_else(|| format!("Apply the {} methodology.", id)),
                )
            }
            InjectionType::GateGuidance => {
                if ctx.command().modifiers.disable_gates {
                    return None;
                }
                let gate_ids = ctx.plan.as_ref()?.gates_for_step(ctx.step.step_number);
                let lines: Vec<String> = self
                    .services
                    .registry
                    .resolve(ctx.scope_id(), gate_ids)
                    .definitions
                    .into_iter()
                    .map(|gate| match gate.guidance {
                        Some(guidance) => format!("{}: {}", gate.name, guidance),
                        None => format!("{}: {}", gate.name, gate.criteria.join("; ")),
                    })
                    .collect();
                (!lines.is_empty()).then(|| format!("Quality gates for this step:\n{}", lines.join("\n")))
            }
            InjectionType::StyleGuidance => {
                let style = ctx.plan.as_ref()?.style.as_deref()?;
                config.styles.get(style).cloned()
            }
        }
    }
}

impl Stage for ResolveInjectionStage {
    fn id(&self) -> &'static str {
        "injection.resolve"
    }

    fn description(&self) -> &'static str {
        "Resolve each injection type into prompt fragments"
    }

    fn run(&self, ctx: &mut ExecutionContext) -> Result<StageFlow, StageError> {
        for decision in self.services.injection.resolve_all(ctx) {
            if !decision.enabled {
                ctx.diagnose(DiagnosticLevel::Debug, decision.reason);
                continue;
            }
            match self.fragment(ctx, decision.injection_type) {
                Some(text) => ctx.injections.push(InjectedFragment {
                    injection_type: decision.injection_type,
                    text,
                }),
                None => ctx.diagnose(
                    DiagnosticLevel::Debug,
                    format!("{} enabled but nothing to inject", decision.injection_type),
                ),
            }
        }
        Ok(StageFlow::Continue)
    }
}
