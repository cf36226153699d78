//! Execution plan produced by the planning stage
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    Single,
    Chain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub strategy: ExecutionStrategy,
    /// Gates for single-prompt execution
    pub gates: Vec<String>,
    /// Gates per 1-based step for chain execution
    #[serde(default)]
    pub step_gates: BTreeMap<u32, Vec<String>>,
    pub requires_framework: bool,
    pub requires_session: bool,
    /// Catalog category of the prompt, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl ExecutionPlan {
    pub fn single(gates: Vec<String>) -> Self {
        Self {
            strategy: ExecutionStrategy::Single,
            requires_session: !gates.is_empty(),
            gates,
            step_gates: BTreeMap::new(),
            requires_framework: true,
            category: None,
            style: None,
        }
    }

    pub fn chain(step_gates: BTreeMap<u32, Vec<String>>) -> Self {
        Self {
            strategy: ExecutionStrategy::Chain,
            gates: Vec::new(),
            step_gates,
            requires_framework: true,
            requires_session: true,
            category: None,
            style: None,
        }
    }

    /// Gates that apply to the given step.
    ///
    /// Chains resolve gates per step; single prompts use the global list.
    pub fn gates_for_step(&self, step: u32) -> &[String] {
        match self.strategy {
            ExecutionStrategy::Single => &self.gates,
            ExecutionStrategy::Chain => self.step_gates.get(&step).map(Vec::as_slice).unwrap_or(&[]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_gates_are_per_step() {
        let mut steps = BTreeMap::new();
        steps.insert(2, vec!["code-quality".to_string()]);
        let plan = ExecutionPlan::chain(steps);

        assert!(plan.gates_for_step(1).is_empty());
        assert_eq!(plan.gates_for_step(2), ["code-quality".to_string()]);
    }

    #[test]
    fn test_single_gates_are_global() {
        let plan = ExecutionPlan::single(vec!["cite-sources".to_string()]);
        assert_eq!(plan.gates_for_step(7).len(), 1);
        assert!(plan.requires_session);
    }
}
