//! Parsed command snapshot
//!
//! The structured form of an inbound request as produced by the command
//! parser. The pipeline only ever reads it.

use crate::context::StepResult;
use crate::data_model::InjectionType;
use serde::{Deserialize, Serialize};

/// Immutable snapshot of the structured input for one request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedCommand {
    /// Prompt or chain identifier (absent when resuming purely by session)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,

    /// Raw argument text following the prompt id
    #[serde(default)]
    pub raw_args: String,

    /// Detected modifiers
    #[serde(default)]
    pub modifiers: Modifiers,

    /// Ad-hoc gates declared inline on the command
    #[serde(default)]
    pub inline_gates: Vec<InlineGate>,

    /// Configured gate ids referenced by the command
    #[serde(default)]
    pub gate_ids: Vec<String>,

    /// Explicit framework override token (`@name`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_override: Option<String>,

    /// Chain identifier for multi-step workflows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,

    /// Chain steps, in order
    #[serde(default)]
    pub steps: Vec<ChainStep>,

    /// 1-based step being executed (defaults to the first)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,

    /// Session to resume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Raw verdict text returned by the calling agent for a pending review
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_verdict: Option<String>,

    /// Selection made by the client during a judge phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_selection: Option<ClientSelection>,

    /// Outcome of the previous chain step, if reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_result: Option<StepResult>,
}

impl ParsedCommand {
    /// A single-prompt command
    pub fn single(prompt_id: impl Into<String>) -> Self {
        Self {
            prompt_id: Some(prompt_id.into()),
            ..Default::default()
        }
    }

    /// A chain command over the given step prompt ids
    pub fn chain(chain_id: impl Into<String>, steps: Vec<ChainStep>) -> Self {
        let chain_id = chain_id.into();
        Self {
            prompt_id: Some(chain_id.clone()),
            chain_id: Some(chain_id),
            steps,
            current_step: Some(1),
            ..Default::default()
        }
    }

    /// A command that only resumes an existing session
    pub fn resume(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    /// Set raw arguments
    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.raw_args = args.into();
        self
    }

    /// Replace the modifier set
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Add an inline gate
    pub fn with_inline_gate(mut self, gate: InlineGate) -> Self {
        self.inline_gates.push(gate);
        self
    }

    /// Reference a configured gate
    pub fn with_gate(mut self, gate_id: impl Into<String>) -> Self {
        self.gate_ids.push(gate_id.into());
        self
    }

    /// Set the framework override token
    pub fn with_framework_override(mut self, framework: impl Into<String>) -> Self {
        self.framework_override = Some(framework.into());
        self
    }

    /// Set the step being executed
    pub fn at_step(mut self, step: u32) -> Self {
        self.current_step = Some(step);
        self
    }

    /// Attach a session id
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attach the agent's verdict text
    pub fn with_verdict(mut self, verdict: impl Into<String>) -> Self {
        self.gate_verdict = Some(verdict.into());
        self
    }

    /// Attach a client selection
    pub fn with_client_selection(mut self, selection: ClientSelection) -> Self {
        self.client_selection = Some(selection);
        self
    }

    /// Report the previous step's outcome
    pub fn with_previous_result(mut self, result: StepResult) -> Self {
        self.previous_result = Some(result);
        self
    }

    pub fn is_chain(&self) -> bool {
        self.steps.len() > 1
    }

    /// Total number of steps (a single prompt counts as one)
    pub fn total_steps(&self) -> u32 {
        self.steps.len().max(1) as u32
    }

    /// The step type declared for the given 1-based step
    pub fn step_type(&self, step: u32) -> Option<&str> {
        let index = step.checked_sub(1)? as usize;
        self.steps.get(index).and_then(|s| s.step_type.as_deref())
    }
}

/// One step of a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStep {
    pub prompt_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<String>,
}

impl ChainStep {
    pub fn new(prompt_id: impl Into<String>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            step_type: None,
        }
    }

    pub fn typed(prompt_id: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            step_type: Some(step_type.into()),
        }
    }
}

/// Gate declared inline with `:: 'criteria'` syntax
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineGate {
    /// Optional id (`security:'no secrets'`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Free-text criteria
    pub criteria: Vec<String>,
}

impl InlineGate {
    pub fn new(criteria: impl Into<String>) -> Self {
        Self {
            id: None,
            criteria: vec![criteria.into()],
        }
    }

    pub fn named(id: impl Into<String>, criteria: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            criteria: vec![criteria.into()],
        }
    }
}

/// Choices returned by the client after a judge phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default)]
    pub gates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl ClientSelection {
    pub fn framework(framework: impl Into<String>) -> Self {
        Self {
            framework: Some(framework.into()),
            ..Default::default()
        }
    }
}

/// Set of injection types a modifier applies to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionSelector {
    /// Applies to every injection type
    #[serde(default)]
    pub all: bool,
    /// Applies to these types only
    #[serde(default)]
    pub types: Vec<InjectionType>,
}

impl InjectionSelector {
    pub fn all() -> Self {
        Self {
            all: true,
            types: Vec::new(),
        }
    }

    pub fn only(injection_type: InjectionType) -> Self {
        Self {
            all: false,
            types: vec![injection_type],
        }
    }

    pub fn covers(&self, injection_type: InjectionType) -> bool {
        self.all || self.types.contains(&injection_type)
    }

    pub fn is_empty(&self) -> bool {
        !self.all && self.types.is_empty()
    }

    fn add(&mut self, injection_type: Option<InjectionType>) {
        match injection_type {
            None => self.all = true,
            Some(t) if !self.types.contains(&t) => self.types.push(t),
            Some(_) => {}
        }
    }
}

/// Modifiers detected on the command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default)]
    pub disable_framework: bool,
    #[serde(default)]
    pub disable_gates: bool,
    /// Request a judge/selection phase instead of execution
    #[serde(default)]
    pub judge: bool,
    #[serde(default)]
    pub disable_injection: InjectionSelector,
    #[serde(default)]
    pub force_injection: InjectionSelector,
}

impl Modifiers {
    /// Map command-language modifier tokens to decision flags.
    ///
    /// Accepts tokens with or without the leading `%`. Unrecognized tokens
    /// are ignored.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut modifiers = Modifiers::default();
        for token in tokens {
            let token = token.as_ref().trim().trim_start_matches('%').to_ascii_lowercase();
            let (name, target) = match token.split_once(':') {
                Some((name, target)) => match target.parse::<InjectionType>() {
                    Ok(t) => (name.to_string(), Some(t)),
                    Err(e) => {
                        // a typed token never widens to every type
                        tracing::debug!(token = %token, error = %e, "ignoring modifier with unknown injection type");
                        continue;
                    }
                },
                None => (token.clone(), None),
            };
            match name.as_str() {
                "clean" => {
                    modifiers.disable_framework = true;
                    modifiers.disable_gates = true;
                    modifiers.disable_injection.add(None);
                }
                "lean" => {
                    modifiers.disable_framework = true;
                    modifiers.disable_injection.add(None);
                }
                "guided" => modifiers.force_injection.add(None),
                "judge" => modifiers.judge = true,
                "no-framework" => modifiers.disable_framework = true,
                "no-gates" => modifiers.disable_gates = true,
                "no-inject" => modifiers.disable_injection.add(target),
                "force-inject" => modifiers.force_injection.add(target),
                other => tracing::debug!(token = other, "ignoring unrecognized modifier"),
            }
        }
        modifiers
    }

    pub fn disables_injection(&self, injection_type: InjectionType) -> bool {
        self.disable_injection.covers(injection_type)
    }

    pub fn forces_injection(&self, injection_type: InjectionType) -> bool {
        self.force_injection.covers(injection_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_disables_everything() {
        let m = Modifiers::from_tokens(["%clean"]);
        assert!(m.disable_framework);
        assert!(m.disable_gates);
        for t in InjectionType::ALL {
            assert!(m.disables_injection(t));
        }
    }

    #[test]
    fn test_lean_keeps_gates() {
        let m = Modifiers::from_tokens(["lean"]);
        assert!(m.disable_framework);
        assert!(!m.disable_gates);
        assert!(m.disables_injection(InjectionType::GateGuidance));
    }

    #[test]
    fn test_typed_injection_tokens() {
        let m = Modifiers::from_tokens(["no-inject:style-guidance", "force-inject:system-prompt"]);
        assert!(m.disables_injection(InjectionType::StyleGuidance));
        assert!(!m.disables_injection(InjectionType::SystemPrompt));
        assert!(m.forces_injection(InjectionType::SystemPrompt));
        assert!(!m.forces_injection(InjectionType::GateGuidance));
    }

    #[test]
    fn test_mistyped_injection_type_is_ignored() {
        let m = Modifiers::from_tokens(["force-inject:persona", "no-inject:gate"]);
        for t in InjectionType::ALL {
            assert!(!m.forces_injection(t));
            assert!(!m.disables_injection(t));
        }

        let m = Modifiers::from_tokens(["no-inject"]);
        for t in InjectionType::ALL {
            assert!(m.disables_injection(t));
        }
    }

    #[test]
    fn test_unknown_tokens_ignored() {
        let m = Modifiers::from_tokens(["%sparkle", "judge"]);
        assert!(m.judge);
        assert!(!m.disable_framework);
    }

    #[test]
    fn test_step_type_lookup() {
        let cmd = ParsedCommand::chain(
            "analysis-flow",
            vec![ChainStep::typed("gather", "research"), ChainStep::new("write")],
        );
        assert!(cmd.is_chain());
        assert_eq!(cmd.total_steps(), 2);
        assert_eq!(cmd.step_type(1), Some("research"));
        assert_eq!(cmd.step_type(2), None);
        assert_eq!(cmd.step_type(0), None);
    }
}
