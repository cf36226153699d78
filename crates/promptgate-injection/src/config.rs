//! Injection rule configuration
//!
//! Every level holds partial rules: unset fields inherit from the next more
//! general level.

use crate::condition::WhenClause;
use promptgate_core::{Frequency, InjectionType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Partial override for one injection type at one level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    /// Ordered conditional clauses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<WhenClause>,
}

impl InjectionRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn with_clause(mut self, clause: WhenClause) -> Self {
        self.when.push(clause);
        self
    }

    /// Whether the rule defines nothing
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.frequency.is_none() && self.when.is_empty()
    }
}

/// Rules keyed by injection type
pub type TypeRules = BTreeMap<InjectionType, InjectionRule>;

/// Exact step selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTarget {
    /// Restrict to one chain (exact id); any chain when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    /// 1-based step number
    pub step: u32,
}

impl StepTarget {
    pub fn matches(&self, chain_id: Option<&str>, step: u32) -> bool {
        self.step == step
            && match &self.chain_id {
                Some(target) => chain_id == Some(target.as_str()),
                None => true,
            }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRule {
    pub target: StepTarget,
    pub rules: TypeRules,
}

/// All configured injection rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionConfigSet {
    #[serde(default)]
    pub global: TypeRules,
    /// Category name → rules
    #[serde(default)]
    pub categories: BTreeMap<String, TypeRules>,
    /// Chain id or glob pattern → rules
    #[serde(default)]
    pub chains: BTreeMap<String, TypeRules>,
    #[serde(default)]
    pub steps: Vec<StepRule>,
}

impl InjectionConfigSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(mut self, injection_type: InjectionType, rule: InjectionRule) -> Self {
        self.global.insert(injection_type, rule);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>, injection_type: InjectionType, rule: InjectionRule) -> Self {
        self.categories.entry(category.into()).or_default().insert(injection_type, rule);
        self
    }

    pub fn with_chain(mut self, pattern: impl Into<String>, injection_type: InjectionType, rule: InjectionRule) -> Self {
        self.chains.entry(pattern.into()).or_default().insert(injection_type, rule);
        self
    }

    pub fn with_step(mut self, target: StepTarget, injection_type: InjectionType, rule: InjectionRule) -> Self {
        match self.steps.iter_mut().find(|s| s.target == target) {
            Some(existing) => {
                existing.rules.insert(injection_type, rule);
            }
            None => {
                let mut rules = TypeRules::new();
                rules.insert(injection_type, rule);
                self.steps.push(StepRule { target, rules });
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, ConditionAction};
    use promptgate_core::GateStatus;

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
global:
  system-prompt:
    frequency: { mode: every-n-steps, n: 3 }
categories:
  analysis:
    style-guidance:
      enabled: false
chains:
  "analysis-*":
    gate-guidance:
      when:
        - condition: { kind: gate-status, status: failed }
          action: inject
steps:
  - target: { chain_id: analysis-flow, step: 2 }
    rules:
      system-prompt:
        enabled: false
"#;
        let config: InjectionConfigSet = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(
            config.global[&InjectionType::SystemPrompt].frequency,
            Some(Frequency::EveryNSteps { n: 3 })
        );
        assert_eq!(config.categories["analysis"][&InjectionType::StyleGuidance].enabled, Some(false));
        assert_eq!(
            config.chains["analysis-*"][&InjectionType::GateGuidance].when[0],
            WhenClause::new(Condition::GateStatus { status: GateStatus::Failed }, ConditionAction::Inject)
        );
        assert!(config.steps[0].target.matches(Some("analysis-flow"), 2));
        assert!(!config.steps[0].target.matches(Some("other"), 2));
    }

    #[test]
    fn test_with_step_merges_same_target() {
        let target = StepTarget { chain_id: None, step: 1 };
        let config = InjectionConfigSet::new()
            .with_step(target.clone(), InjectionType::SystemPrompt, InjectionRule::new().enabled(false))
            .with_step(target, InjectionType::StyleGuidance, InjectionRule::new().enabled(true));
        assert_eq!(config.steps.len(), 1);
        assert_eq!(config.steps[0].rules.len(), 2);
    }

    #[test]
    fn test_empty_rule() {
        assert!(InjectionRule::new().is_empty());
        assert!(!InjectionRule::new().enabled(true).is_empty());
    }
}
