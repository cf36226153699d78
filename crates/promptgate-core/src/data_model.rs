//! Data Model: decision records shared by every crate in the pipeline
use crate::diagnostics::DiagnosticEntry;
use crate::review::PendingGateReview;
use crate::runner::StageMetric;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// INJECTION
// ============================================================================

/// Category of content the pipeline may insert into a step's prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InjectionType {
    SystemPrompt,
    GateGuidance,
    StyleGuidance,
}

impl InjectionType {
    pub const ALL: [InjectionType; 3] = [
        InjectionType::SystemPrompt,
        InjectionType::GateGuidance,
        InjectionType::StyleGuidance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InjectionType::SystemPrompt => "system-prompt",
            InjectionType::GateGuidance => "gate-guidance",
            InjectionType::StyleGuidance => "style-guidance",
        }
    }

    /// Hardcoded frequency used when no configuration level defines one
    pub fn default_frequency(&self) -> Frequency {
        match self {
            InjectionType::SystemPrompt => Frequency::EveryNSteps { n: 2 },
            InjectionType::GateGuidance => Frequency::EveryStep,
            InjectionType::StyleGuidance => Frequency::FirstStepOnly,
        }
    }
}

impl fmt::Display for InjectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InjectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "system-prompt" | "system" => Ok(InjectionType::SystemPrompt),
            "gate-guidance" | "gates" => Ok(InjectionType::GateGuidance),
            "style-guidance" | "style" => Ok(InjectionType::StyleGuidance),
            other => Err(format!("unknown injection type: {}", other)),
        }
    }
}

/// How often an enabled injection fires across chain steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum Frequency {
    EveryNSteps { n: u32 },
    FirstStepOnly,
    EveryStep,
}

impl Frequency {
    /// Whether the injection fires on the given 1-based step
    pub fn should_inject(&self, step_number: u32) -> bool {
        match self {
            Frequency::EveryNSteps { n } => step_number.saturating_sub(1) % (*n).max(1) == 0,
            Frequency::FirstStepOnly => step_number <= 1,
            Frequency::EveryStep => true,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::EveryNSteps { n } => write!(f, "every-{}-steps", n),
            Frequency::FirstStepOnly => f.write_str("first-step-only"),
            Frequency::EveryStep => f.write_str("every-step"),
        }
    }
}

/// Configuration hierarchy level, most specific first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HierarchyLevel {
    RuntimeOverride,
    Step,
    Chain,
    Category,
    Global,
    SystemDefault,
}

impl fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HierarchyLevel::RuntimeOverride => "runtime-override",
            HierarchyLevel::Step => "step",
            HierarchyLevel::Chain => "chain",
            HierarchyLevel::Category => "category",
            HierarchyLevel::Global => "global",
            HierarchyLevel::SystemDefault => "system-default",
        };
        f.write_str(s)
    }
}

/// One fully-resolved configuration for an (injection type, step) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedInjectionConfig {
    pub injection_type: InjectionType,
    pub enabled: bool,
    pub frequency: Frequency,
    /// Most specific level that contributed a field
    pub source: HierarchyLevel,
}

impl ResolvedInjectionConfig {
    /// Hardcoded system default for a type
    pub fn system_default(injection_type: InjectionType) -> Self {
        Self {
            injection_type,
            enabled: true,
            frequency: injection_type.default_frequency(),
            source: HierarchyLevel::SystemDefault,
        }
    }
}

/// Which step of the decision procedure produced an injection decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InjectionDecisionSource {
    Modifier,
    Condition,
    Hierarchy,
}

/// Final injection decision for one type at one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionDecision {
    pub injection_type: InjectionType,
    /// Whether content of this type is injected at this step
    pub enabled: bool,
    pub step_number: u32,
    pub decided_by: InjectionDecisionSource,
    /// Resolved configuration (absent when a modifier short-circuited)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ResolvedInjectionConfig>,
    pub reason: String,
}

/// Content chosen for injection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectedFragment {
    pub injection_type: InjectionType,
    pub text: String,
}

// ============================================================================
// FRAMEWORK
// ============================================================================

/// Priority level that settled a framework decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameworkSource {
    ModifierDisabled,
    OperatorOverride,
    ClientSelection,
    GlobalActive,
}

/// Whether and which framework applies to a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkDecision {
    pub should_apply: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<String>,
    pub source: FrameworkSource,
    pub reason: String,
    pub decided_at: DateTime<Utc>,
}

// ============================================================================
// GATES
// ============================================================================

/// How seriously a failed gate verdict is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    #[default]
    Strict,
    Advisory,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictDecision {
    Pass,
    Fail,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Explicit,
    Implicit,
    Unknown,
}

/// Verdict extracted from the calling agent's review response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub decision: VerdictDecision,
    /// 0.0 to 1.0
    pub confidence: f32,
    pub match_type: MatchType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl GateVerdict {
    pub fn unknown() -> Self {
        Self {
            decision: VerdictDecision::Unknown,
            confidence: 0.0,
            match_type: MatchType::Unknown,
            rationale: None,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.decision == VerdictDecision::Pass
    }

    /// Unknown verdicts count as failures for enforcement
    pub fn counts_as_failure(&self) -> bool {
        !self.is_pass()
    }
}

/// What the caller should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateAction {
    InjectReviewPrompt,
    Continue,
    RetryWithFeedback,
    AbortChain,
}

/// How a gate cycle ended, when it has ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateOutcome {
    /// Gates were off, empty, or disabled by modifier
    NotRequired,
    Passed,
    /// Failed under advisory enforcement; logged, not blocking
    AdvisoryFailure,
    /// Retry limit exceeded; the gate could not be satisfied
    Exhausted,
}

/// Result of one gate-enforcement decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateEnforcementDecision {
    pub action: GateAction,
    pub mode: EnforcementMode,
    pub gate_ids: Vec<String>,
    /// Retries consumed so far
    pub attempt: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<GateVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GateOutcome>,
    /// Review prompt to send to the client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_prompt: Option<String>,
    /// Accumulated feedback for a retry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Updated review record for the caller to persist (absent when cleared)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<PendingGateReview>,
    pub reason: String,
}

impl GateEnforcementDecision {
    /// Whether the step may progress
    pub fn allows_progress(&self) -> bool {
        self.action == GateAction::Continue
    }

    /// Whether the chain cannot continue
    pub fn is_terminal_failure(&self) -> bool {
        self.outcome == Some(GateOutcome::Exhausted)
    }
}

// ============================================================================
// RESPONSE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseStatus {
    /// Prompt or final chain step finished
    Completed,
    /// A chain step finished and more remain
    StepCompleted,
    /// A judge phase is waiting for the client's selection
    AwaitingSelection,
    /// A gate review prompt was sent and a verdict is awaited
    AwaitingReview,
    /// The step must be redone with feedback
    RetryRequested,
    /// The gate could not be satisfied; the chain is failed
    ChainAborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProgress {
    pub current: u32,
    pub total: u32,
}

impl fmt::Display for StepProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step {} of {}", self.current, self.total)
    }
}

/// Structured response returned by the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub request_id: String,
    pub pipeline_id: String,
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
    /// Composed text for the client
    pub content: String,
    #[serde(default)]
    pub injections: Vec<InjectedFragment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<FrameworkDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateEnforcementDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<StepProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_fingerprint: Option<String>,
    #[serde(default)]
    pub diagnostics: Vec<DiagnosticEntry>,
    #[serde(default)]
    pub stages: Vec<StageMetric>,
}

/// Content fingerprint in `blake3:<hex>` form
pub fn fingerprint(data: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_n_steps() {
        let f = Frequency::EveryNSteps { n: 2 };
        let fired: Vec<u32> = (1..=6).filter(|s| f.should_inject(*s)).collect();
        assert_eq!(fired, vec![1, 3, 5]);
    }

    #[test]
    fn test_first_step_only() {
        let f = Frequency::FirstStepOnly;
        let fired: Vec<u32> = (1..=6).filter(|s| f.should_inject(*s)).collect();
        assert_eq!(fired, vec![1]);
    }

    #[test]
    fn test_every_n_zero_is_every_step() {
        let f = Frequency::EveryNSteps { n: 0 };
        assert!((1..=4).all(|s| f.should_inject(s)));
    }

    #[test]
    fn test_injection_type_parse() {
        assert_eq!("gate_guidance".parse::<InjectionType>(), Ok(InjectionType::GateGuidance));
        assert_eq!("style".parse::<InjectionType>(), Ok(InjectionType::StyleGuidance));
        assert!("persona".parse::<InjectionType>().is_err());
    }

    #[test]
    fn test_frequency_yaml_shape() {
        let f: Frequency = serde_json::from_str(r#"{"mode":"every-n-steps","n":3}"#).unwrap();
        assert_eq!(f, Frequency::EveryNSteps { n: 3 });
        let f: Frequency = serde_json::from_str(r#"{"mode":"first-step-only"}"#).unwrap();
        assert_eq!(f, Frequency::FirstStepOnly);
    }

    #[test]
    fn test_unknown_verdict_counts_as_failure() {
        assert!(GateVerdict::unknown().counts_as_failure());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert!(fingerprint(b"abc").starts_with("blake3:"));
    }
}
