//! promptgate Core: Execution Context, Stage Contract, and Pipeline Runner
//!
//! Per-request state lives in [`ExecutionContext`]; stages implement the
//! [`Stage`] contract and the [`PipelineRunner`] drives them in order,
//! recording diagnostics and running cleanup handlers on every exit path.
//!
//! # Pipeline Flow
//!
//! ```text
//! ParsedCommand → validate → scope → plan → inline gates → session → gate review
//!                                                                       ↓
//!            response ← injection ← framework ←─────────────────────────┘
//!                ↓
//!   cleanup handlers (always run)
//! ```

pub mod command;
pub mod context;
pub mod data_model;
pub mod diagnostics;
pub mod error;
pub mod plan;
pub mod review;
pub mod runner;
pub mod stage;

pub use command::{ChainStep, ClientSelection, InjectionSelector, InlineGate, Modifiers, ParsedCommand};
pub use context::{DecisionCache, ExecutionContext, GateStatus, InjectionCacheKey, StepContext, StepResult};
pub use data_model::{
    fingerprint, EnforcementMode, FrameworkDecision, FrameworkSource, Frequency, GateAction,
    GateEnforcementDecision, GateOutcome, GateVerdict, HierarchyLevel, InjectedFragment,
    InjectionDecision, InjectionDecisionSource, InjectionType, MatchType, PipelineResponse,
    ResolvedInjectionConfig, ResponseStatus, StepProgress, VerdictDecision,
};
pub use diagnostics::{DiagnosticEntry, DiagnosticLevel, DiagnosticsLog};
pub use error::PromptGateError;
pub use plan::{ExecutionPlan, ExecutionStrategy};
pub use review::{PendingGateReview, RejectOutcome, ReviewResolution, ReviewStatus, TransitionError};
pub use runner::{PipelineError, PipelineRunner, StageMetric, StageOutcome};
pub use stage::{Stage, StageError, StageFlow};

/// Engine version reported in responses and health checks
pub const PROMPTGATE_VERSION: &str = "1.0.0";
