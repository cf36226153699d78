use crate::services::PipelineServices;
use promptgate_core::{ExecutionContext, ExecutionPlan, Stage, StageError, StageFlow};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds the execution plan from the prompt catalog and the command
pub struct ResolvePlanStage {
    services: Arc<PipelineServices>,
}

impl ResolvePlanStage {
    pub fn new(services: Arc<PipelineServices>) -> Self {
        Self { services }
    }
}

impl Stage for ResolvePlanStage {
    fn id(&self) -> &'static str {
        "plan.resolve"
    }

    fn description(&self) -> &'static str {
        "Pick the strategy and resolve gates per step"
    }

    fn run(&self, ctx: &mut ExecutionContext) -> Result<StageFlow, StageError> {
        let config = &self.services.config;
        let command = ctx.command();
        let entry = command.prompt_id.as_deref().and_then(|id| config.prompt(id));

        let mut plan = if command.is_chain() {
            let mut step_gates: BTreeMap<u32, Vec<String>> = entry.map(|e| e.step_gates.clone()).unwrap_or_default();
            // gates declared on each step's own prompt apply to that step
            for (index, step) in command.steps.iter().enumerate() {
                if let Some(step_entry) = config.prompt(&step.prompt_id) {
                    let gates = step_gates.entry(index as u32 + 1).or_default();
                    extend_unique(gates, &step_entry.gates);
                }
            }
            let current = step_gates.entry(ctx.step.step_number).or_default();
            extend_unique(current, &command.gate_ids);
            step_gates.retain(|_, gates| !gates.is_empty());
            ExecutionPlan::chain(step_gates)
        } else {
            let mut gates = entry.map(|e| e.gates.clone()).unwrap_or_default();
            extend_unique(&mut gates, &command.gate_ids);
            let mut plan = ExecutionPlan::single(gates);
            plan.requires_session |= command.session_id.is_some();
            plan
        };

        plan.requires_framework = !command.modifiers.disable_framework;
        plan.category = entry.and_then(|e| e.category.clone());
        plan.style = ctx
            .client_selection
            .as_ref()
            .and_then(|s| s.style.clone())
            .or_else(|| entry.and_then(|e| e.style.clone()));

        if entry.is_none() {
            if let Some(id) = command.prompt_id.clone() {
                ctx.diagnose_code(
                    promptgate_core::DiagnosticLevel::Info,
                    "PROMPT_NOT_IN_CATALOG",
                    format!("prompt {} has no catalog entry; using defaults", id),
                );
            }
        }

        tracing::debug!(
            request_id = %ctx.request_id,
            strategy = ?plan.strategy,
            gates = ?plan.gates_for_step(ctx.step.step_number),
            "plan resolved"
        );
        ctx.plan = Some(plan);
        Ok(StageFlow::Continue)
    }
}

fn extend_unique(target: &mut Vec<String>, extra: &[String]) {
    for id in extra {
        if !target.contains(id) {
            target.push(id.clone());
        }
    }
}
