//! Conditional `when` clauses
//!
//! Each clause pairs one predicate with an action. Clauses are evaluated in
//! order and the first match wins; nothing after a match is evaluated.

use promptgate_core::{GateStatus, StepContext, StepResult};
use serde::{Deserialize, Serialize};

/// A predicate over the current step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Condition {
    /// Gate state of the current step
    GateStatus { status: GateStatus },
    /// Step type is one of the listed types (case-insensitive)
    StepType { types: Vec<String> },
    /// Compare the 1-based step number
    StepNumber { op: Comparison, value: u32 },
    /// Outcome of the previous step
    PreviousResult { result: StepResult },
    /// Position of the step in its chain
    ChainPosition { position: ChainPosition },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    fn holds(&self, left: u32, right: u32) -> bool {
        match self {
            Comparison::Eq => left == right,
            Comparison::Ne => left != right,
            Comparison::Gt => left > right,
            Comparison::Gte => left >= right,
            Comparison::Lt => left < right,
            Comparison::Lte => left <= right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainPosition {
    First,
    Middle,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionAction {
    Inject,
    Skip,
    /// Fall through to hierarchical resolution
    Inherit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhenClause {
    pub condition: Condition,
    pub action: ConditionAction,
}

impl WhenClause {
    pub fn new(condition: Condition, action: ConditionAction) -> Self {
        Self { condition, action }
    }
}

/// A matched clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClauseMatch {
    pub index: usize,
    pub action: ConditionAction,
}

/// Stateless predicate engine over `when` clauses
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Return the first clause whose predicate holds
    pub fn evaluate(&self, clauses: &[WhenClause], step: &StepContext) -> Option<ClauseMatch> {
        clauses
            .iter()
            .position(|clause| self.matches(&clause.condition, step))
            .map(|index| ClauseMatch {
                index,
                action: clauses[index].action,
            })
    }

    pub fn matches(&self, condition: &Condition, step: &StepContext) -> bool {
        match condition {
            Condition::GateStatus { status } => step.gate_status == *status,
            Condition::StepType { types } => step
                .step_type
                .as_deref()
                .map(|t| types.iter().any(|candidate| candidate.eq_ignore_ascii_case(t)))
                .unwrap_or(false),
            Condition::StepNumber { op, value } => op.holds(step.step_number, *value),
            Condition::PreviousResult { result } => step.previous_result == Some(*result),
            Condition::ChainPosition { position } => match position {
                ChainPosition::First => step.is_first(),
                ChainPosition::Last => step.is_last(),
                ChainPosition::Middle => !step.is_first() && !step.is_last(),
            },
        }
    }
}
