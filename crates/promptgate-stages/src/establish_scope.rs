use promptgate_core::{ExecutionContext, Stage, StageError, StageFlow};

/// Fixes the execution scope id used to tag temporary registrations
#[derive(Debug, Default)]
pub struct EstablishScopeStage;

impl Stage for EstablishScopeStage {
    fn id(&self) -> &'static str {
        "scope.establish"
    }

    fn description(&self) -> &'static str {
        "Derive the scope id from the session, the chain, or a fresh id"
    }

    fn run(&self, ctx: &mut ExecutionContext) -> Result<StageFlow, StageError> {
        let scope = ctx.establish_scope().to_string();
        tracing::debug!(request_id = %ctx.request_id, scope_id = %scope, "scope established");
        Ok(StageFlow::Continue)
    }
}
