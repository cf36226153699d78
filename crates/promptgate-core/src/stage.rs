//! Stage Trait: the single contract every pipeline stage implements
use crate::context::ExecutionContext;

/// Contract of a pipeline stage
pub trait Stage: Send + Sync {
    /// Unique stage id (ex: "plan.resolve")
    fn id(&self) -> &'static str;

    /// Short human-readable description
    fn description(&self) -> &'static str {
        ""
    }

    /// Whether the stage applies to this request (default: always)
    fn should_run(&self, _ctx: &ExecutionContext) -> bool {
        true
    }

    /// Execute the stage against the shared context
    fn run(&self, ctx: &mut ExecutionContext) -> Result<StageFlow, StageError>;
}

/// What the runner does after a stage returns successfully
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageFlow {
    /// Run the next stage
    Continue,
    /// The response is complete; skip the remaining stages
    Complete,
}

#[derive(Debug, Clone)]
pub enum StageError {
    ValidationFailed(String),
    ExecutionFailed(String),
    MissingPrerequisite { field: &'static str, required_by: &'static str },
    Collaborator(String),
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "COMMAND/VALIDATION: {}", msg),
            Self::ExecutionFailed(msg) => write!(f, "STAGE/EXEC: {}", msg),
            Self::MissingPrerequisite { field, required_by } => {
                write!(f, "STAGE/ORDER: {} requires {} to be set", required_by, field)
            }
            Self::Collaborator(msg) => write!(f, "COLLABORATOR: {}", msg),
        }
    }
}

impl std::error::Error for StageError {}
