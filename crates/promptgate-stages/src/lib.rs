//! promptgate Stages: the concrete pipeline and its wiring
//!
//! Each stage reads and writes the shared [`ExecutionContext`] and consults
//! the decision authorities held by [`PipelineServices`].
//!
//! # Pipeline Flow
//!
//! ```text
//! command.validate → scope.establish → plan.resolve → gates.inline → session.load
//!        → gates.review → framework.resolve → injection.resolve → response.compose
//! ```
//!
//! [`ExecutionContext`]: promptgate_core::ExecutionContext

mod compose_response;
mod establish_scope;
mod gate_review;
mod inline_gates;
mod load_session;
mod resolve_framework;
mod resolve_injection;
mod resolve_plan;
mod validate_command;

pub mod config;
pub mod services;

pub use compose_response::ComposeResponseStage;
pub use config::{PromptEntry, ServerConfig};
pub use establish_scope::EstablishScopeStage;
pub use gate_review::GateReviewStage;
pub use inline_gates::RegisterInlineGatesStage;
pub use load_session::LoadSessionStage;
pub use resolve_framework::ResolveFrameworkStage;
pub use resolve_injection::ResolveInjectionStage;
pub use resolve_plan::ResolvePlanStage;
pub use services::{PipelineServices, PipelineServicesBuilder};
pub use validate_command::ValidateCommandStage;

use promptgate_core::{PipelineRunner, Stage};
use std::sync::Arc;

// ============================================================================
// CONVENIENCE BUILDERS
// ============================================================================

/// The stages of the standard pipeline, in execution order
pub fn standard_stages(services: Arc<PipelineServices>) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(ValidateCommandStage),
        Box::new(EstablishScopeStage),
        Box::new(ResolvePlanStage::new(Arc::clone(&services))),
        Box::new(RegisterInlineGatesStage::new(Arc::clone(&services))),
        Box::new(LoadSessionStage::new(Arc::clone(&services))),
        Box::new(GateReviewStage::new(Arc::clone(&services))),
        Box::new(ResolveFrameworkStage::new(Arc::clone(&services))),
        Box::new(ResolveInjectionStage::new(Arc::clone(&services))),
        Box::new(ComposeResponseStage::new(services)),
    ]
}

/// Create the standard pipeline runner
pub fn standard_pipeline(services: Arc<PipelineServices>) -> PipelineRunner {
    PipelineRunner::new(standard_stages(services))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_pipeline_order() {
        let services = Arc::new(PipelineServices::from_config(ServerConfig::default()).unwrap());
        let pipeline = standard_pipeline(services);

        assert_eq!(pipeline.len(), 9);
        assert_eq!(pipeline.stage_ids().first(), Some(&"command.validate"));
        assert_eq!(pipeline.stage_ids().last(), Some(&"response.compose"));
        assert!(pipeline.get_stage("gates.review").is_some());
        assert!(pipeline.pipeline_id().starts_with("command→scope→plan"));
    }
}
