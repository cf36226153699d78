//! Gate enforcement authority
//!
//! Drives one gate-review cycle per call through the [`PendingGateReview`]
//! transitions and reports what the caller should do next.
//!
//! ```text
//!  no review ──create──▶ pending ──▶ injected ──verdict──▶ responded
//!                           ▲                                  │
//!                           │ reject (retries left)            │ pass / advisory / exhausted
//!                           └──────────────────────────────────┤
//!                                                              ▼
//!                                                          resolved
//! ```
//!
//! The authority performs no I/O; the returned decision carries the updated
//! review for the caller to persist or clear.

use crate::registry::GateDefinition;
use crate::verdict::VerdictParser;
use chrono::{DateTime, Utc};
use promptgate_core::{
    DiagnosticLevel, EnforcementMode, ExecutionContext, GateAction, GateEnforcementDecision, GateOutcome,
    GateVerdict, MatchType, PendingGateReview, RejectOutcome, ReviewStatus, TransitionError,
};
use serde::{Deserialize, Serialize};

/// Instruction that closes every review prompt
pub const REVIEW_INSTRUCTION: &str = "Respond: GATE_REVIEW: PASS|FAIL - <reason>";

/// What happens once retries run out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionAction {
    /// Fail the chain
    #[default]
    Abort,
    /// Record the failure and let the chain continue
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries allowed after the first failed verdict
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub on_exhaustion: ExhaustionAction,
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            on_exhaustion: ExhaustionAction::Abort,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn skip_on_exhaustion(mut self) -> Self {
        self.on_exhaustion = ExhaustionAction::Skip;
        self
    }
}

/// Gate configuration section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSettings {
    #[serde(default)]
    pub enforcement_mode: EnforcementMode,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub definitions: Vec<GateDefinition>,
}

/// Inputs to one enforcement decision
#[derive(Debug, Clone, Default)]
pub struct GateEnforcementInput {
    pub session_id: String,
    pub gate_ids: Vec<String>,
    pub step_number: u32,
    pub mode: EnforcementMode,
    /// Set when the command disabled gates
    pub gates_disabled: bool,
    /// Global retry policy
    pub retry: RetryConfig,
    /// Retry policies declared by the individual gates
    pub gate_retries: Vec<RetryConfig>,
    /// Raw verdict payload returned by the agent
    pub verdict: Option<String>,
    /// Review loaded from the session store
    pub review: Option<PendingGateReview>,
    /// Prompt to use when a new review is opened
    pub review_prompt: String,
}

impl GateEnforcementInput {
    pub fn new(session_id: impl Into<String>, gate_ids: Vec<String>) -> Self {
        Self {
            session_id: session_id.into(),
            gate_ids,
            step_number: 1,
            ..Default::default()
        }
    }

    pub fn at_step(mut self, step_number: u32) -> Self {
        self.step_number = step_number;
        self
    }

    pub fn mode(mut self, mode: EnforcementMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_gate_retry(mut self, retry: RetryConfig) -> Self {
        self.gate_retries.push(retry);
        self
    }

    pub fn verdict(mut self, verdict: impl Into<String>) -> Self {
        self.verdict = Some(verdict.into());
        self
    }

    pub fn review(mut self, review: Option<PendingGateReview>) -> Self {
        self.review = review;
        self
    }

    pub fn review_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.review_prompt = prompt.into();
        self
    }

    /// Retry policy in force: per-gate settings win over the global one, and
    /// the strictest per-gate setting wins among several
    pub fn effective_retry(&self) -> RetryConfig {
        self.gate_retries
            .iter()
            .min_by_key(|r| (r.max_attempts, r.on_exhaustion == ExhaustionAction::Skip))
            .copied()
            .unwrap_or(self.retry)
    }
}

/// Compose the review prompt for a set of gates
pub fn compose_review_prompt(gates: &[GateDefinition], step_number: u32) -> String {
    let mut lines = vec![format!("[Gate Review] Step {}", step_number)];
    for gate in gates {
        lines.push(format!("{}:", gate.name));
        if gate.criteria.is_empty() {
            lines.push("  - output satisfies the gate".to_string());
        }
        for criterion in &gate.criteria {
            lines.push(format!("  - {}", criterion));
        }
    }
    lines.push(REVIEW_INSTRUCTION.to_string());
    lines.join("\n")
}

/// Single source of truth for gate enforcement
#[derive(Debug, Clone, Copy, Default)]
pub struct GateEnforcementAuthority {
    parser: VerdictParser,
}

impl GateEnforcementAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide for this request, caching the decision on the context and
    /// recording diagnostics for unparsable, advisory, and exhausted verdicts
    pub fn decide(&self, ctx: &mut ExecutionContext, input: &GateEnforcementInput) -> GateEnforcementDecision {
        if let Some(cached) = ctx.gate_decision() {
            return cached.clone();
        }

        let decision = self.evaluate(input, Utc::now());

        if let Some(verdict) = &decision.verdict {
            if verdict.match_type == MatchType::Unknown {
                ctx.diagnose_code(
                    DiagnosticLevel::Warning,
                    "GATE_VERDICT_UNKNOWN",
                    "could not parse a verdict from the review response; treated as fail",
                );
            }
        }
        match decision.outcome {
            Some(GateOutcome::AdvisoryFailure) => ctx.diagnose_code(
                DiagnosticLevel::Warning,
                "GATE_ADVISORY_FAILURE",
                format!("gates {} failed under advisory enforcement", decision.gate_ids.join(", ")),
            ),
            Some(GateOutcome::Exhausted) => ctx.diagnose_code(
                DiagnosticLevel::Error,
                "GATE_EXHAUSTED",
                format!(
                    "gates {} could not be satisfied after {} retries",
                    decision.gate_ids.join(", "),
                    decision.attempt
                ),
            ),
            _ => {}
        }

        tracing::info!(
            session_id = %input.session_id,
            gate_ids = ?decision.gate_ids,
            action = ?decision.action,
            attempt = decision.attempt,
            "gate decision"
        );
        ctx.decisions_mut().gate = Some(decision.clone());
        decision
    }

    /// Compute a decision without touching any context
    pub fn evaluate(&self, input: &GateEnforcementInput, now: DateTime<Utc>) -> GateEnforcementDecision {
        if input.gates_disabled {
            return not_required(input, "gates disabled by modifier");
        }
        if input.mode == EnforcementMode::Off {
            return not_required(input, "enforcement is off");
        }
        if input.gate_ids.is_empty() {
            return not_required(input, "no gates apply to this step");
        }

        let current = input
            .review
            .clone()
            .filter(|r| !r.is_resolved() && r.step_number == input.step_number);

        let outcome = match current {
            None => self.open(input, now),
            Some(review) => self.advance(input, review, now),
        };

        outcome.unwrap_or_else(|e| {
            tracing::warn!(session_id = %input.session_id, error = %e, "review record out of sequence, reopening");
            self.open(input, now).unwrap_or_else(|_| not_required(input, "review could not be opened"))
        })
    }

    fn open(&self, input: &GateEnforcementInput, now: DateTime<Utc>) -> Result<GateEnforcementDecision, TransitionError> {
        let retry = input.effective_retry();
        let mut review = PendingGateReview::new(
            input.session_id.clone(),
            input.gate_ids.clone(),
            input.review_prompt.clone(),
            retry.max_attempts,
            now,
        )
        .for_step(input.step_number);
        review.mark_injected(now)?;

        let mut decision = base(input, &review, GateAction::InjectReviewPrompt, "review requested");
        decision.review_prompt = Some(review.prompt.clone());
        decision.review = Some(review);
        Ok(decision)
    }

    fn advance(
        &self,
        input: &GateEnforcementInput,
        mut review: PendingGateReview,
        now: DateTime<Utc>,
    ) -> Result<GateEnforcementDecision, TransitionError> {
        match review.status {
            ReviewStatus::Pending => {
                review.mark_injected(now)?;
                Ok(self.reinject(input, review, GateAction::InjectReviewPrompt, "review prompt re-sent"))
            }
            ReviewStatus::Injected => match input.verdict.as_deref() {
                None => Ok(self.reinject(input, review, GateAction::InjectReviewPrompt, "awaiting review verdict")),
                Some(payload) => {
                    review.record_response(payload, now)?;
                    self.settle(input, review, now)
                }
            },
            ReviewStatus::Responded => self.settle(input, review, now),
            ReviewStatus::Resolved => self.open(input, now),
        }
    }

    /// Apply the recorded response of a `responded` review
    fn settle(
        &self,
        input: &GateEnforcementInput,
        mut review: PendingGateReview,
        now: DateTime<Utc>,
    ) -> Result<GateEnforcementDecision, TransitionError> {
        let verdict = self.parser.parse(review.last_response.as_deref().unwrap_or_default());
        let feedback = verdict_feedback(&verdict);

        if verdict.is_pass() {
            review.accept(now)?;
            let mut decision = base(input, &review, GateAction::Continue, "gate review passed");
            decision.outcome = Some(GateOutcome::Passed);
            decision.verdict = Some(verdict);
            decision.review = Some(review);
            return Ok(decision);
        }

        if input.mode == EnforcementMode::Advisory {
            review.resolve_advisory(feedback, now)?;
            let mut decision = base(input, &review, GateAction::Continue, "gate review failed (advisory)");
            decision.outcome = Some(GateOutcome::AdvisoryFailure);
            decision.feedback = Some(review.feedback_text());
            decision.verdict = Some(verdict);
            decision.review = Some(review);
            return Ok(decision);
        }

        match review.reject(feedback, now)? {
            RejectOutcome::RetryScheduled(attempt) => {
                review.mark_injected(now)?;
                let reason = format!("gate review failed, retry {} of {}", attempt, review.max_attempts);
                let mut decision = self.reinject(input, review, GateAction::RetryWithFeedback, reason);
                decision.verdict = Some(verdict);
                Ok(decision)
            }
            RejectOutcome::Exhausted => {
                let retry = input.effective_retry();
                let (action, reason) = match retry.on_exhaustion {
                    ExhaustionAction::Abort => (GateAction::AbortChain, "gate could not be satisfied, chain aborted"),
                    ExhaustionAction::Skip => (GateAction::Continue, "gate could not be satisfied, step skipped"),
                };
                let mut decision = base(input, &review, action, reason);
                decision.outcome = Some(GateOutcome::Exhausted);
                decision.feedback = Some(review.feedback_text());
                decision.verdict = Some(verdict);
                decision.review = Some(review);
                Ok(decision)
            }
        }
    }

    fn reinject(
        &self,
        input: &GateEnforcementInput,
        review: PendingGateReview,
        action: GateAction,
        reason: impl Into<String>,
    ) -> GateEnforcementDecision {
        let mut decision = base(input, &review, action, reason);
        if review.feedback.is_empty() {
            decision.review_prompt = Some(review.prompt.clone());
        } else {
            let feedback = review.feedback_text();
            decision.review_prompt = Some(format!("{}\n\nPrevious feedback:\n{}", review.prompt, feedback));
            decision.feedback = Some(feedback);
        }
        decision.review = Some(review);
        decision
    }
}

fn verdict_feedback(verdict: &GateVerdict) -> String {
    match (&verdict.rationale, verdict.match_type) {
        (Some(rationale), _) => rationale.clone(),
        (None, MatchType::Unknown) => "no parsable verdict in the review response".to_string(),
        (None, _) => "failed without a stated reason".to_string(),
    }
}

fn base(
    input: &GateEnforcementInput,
    review: &PendingGateReview,
    action: GateAction,
    reason: impl Into<String>,
) -> GateEnforcementDecision {
    GateEnforcementDecision {
        action,
        mode: input.mode,
        gate_ids: review.gate_ids.clone(),
        attempt: review.retry_count,
        max_attempts: review.max_attempts,
        verdict: None,
        outcome: None,
        review_prompt: None,
        feedback: None,
        review: None,
        reason: reason.into(),
    }
}

fn not_required(input: &GateEnforcementInput, reason: &str) -> GateEnforcementDecision {
    GateEnforcementDecision {
        action: GateAction::Continue,
        mode: input.mode,
        gate_ids: input.gate_ids.clone(),
        attempt: 0,
        max_attempts: input.effective_retry().max_attempts,
        verdict: None,
        outcome: Some(GateOutcome::NotRequired),
        review_prompt: None,
        feedback: None,
        review: None,
        reason: reason.to_string(),
    }
}
