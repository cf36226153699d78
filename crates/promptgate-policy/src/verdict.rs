//! Verdict extraction from the agent's review response
//!
//! Two forms are recognized:
//!
//! - an explicit marker line, `GATE_REVIEW: PASS - <reason>` (or `VERDICT:`),
//!   matched case-insensitively with full confidence;
//! - free-text self-review, classified by pass/fail phrases with reduced
//!   confidence.
//!
//! Anything else, including text with both pass and fail phrases, is
//! `unknown`.

use once_cell::sync::Lazy;
use promptgate_core::{GateVerdict, MatchType, VerdictDecision};
use regex::Regex;

static EXPLICIT_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[\s>*_`]*(?:GATE_REVIEW|VERDICT)[\s*_`]*:[\s*_`]*(PASS|FAIL)\b[\s*_`]*(?:[-:]\s*(.*?))?\s*$")
        .expect("marker pattern")
});

const PASS_PHRASES: &[&str] = &[
    "all criteria met",
    "all criteria are met",
    "meets all criteria",
    "meets the criteria",
    "passes the gate",
    "gate passed",
    "looks good",
    "no issues found",
    "nothing is missing",
    "nothing missing",
    "requirements satisfied",
    "requirements are satisfied",
];

const FAIL_PHRASES: &[&str] = &[
    "does not meet",
    "doesn't meet",
    "criteria not met",
    "not satisfied",
    "fails the gate",
    "gate failed",
    "needs improvement",
    "is missing",
    "are missing",
    "missing from",
    "issues found",
];

/// Confidence assigned to phrase-based verdicts
pub const IMPLICIT_CONFIDENCE: f32 = 0.6;

#[derive(Debug, Clone, Copy, Default)]
pub struct VerdictParser;

impl VerdictParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, response: &str) -> GateVerdict {
        if let Some(verdict) = self.explicit(response) {
            return verdict;
        }
        self.implicit(response)
    }

    /// Last explicit marker wins when several are present
    fn explicit(&self, response: &str) -> Option<GateVerdict> {
        let caps = EXPLICIT_MARKER.captures_iter(response).last()?;
        let decision = match caps.get(1)?.as_str().to_ascii_uppercase().as_str() {
            "PASS" => VerdictDecision::Pass,
            _ => VerdictDecision::Fail,
        };
        let rationale = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty());

        Some(GateVerdict {
            decision,
            confidence: 1.0,
            match_type: MatchType::Explicit,
            rationale,
        })
    }

    fn implicit(&self, response: &str) -> GateVerdict {
        let lowered = response.to_lowercase();
        // "no issues found" must not also count as "issues found", nor
        // "nothing is missing" as "is missing"
        let scrubbed = PASS_PHRASES
            .iter()
            .fold(lowered.clone(), |text, phrase| text.replace(phrase, " "));

        let passes = PASS_PHRASES.iter().any(|p| lowered.contains(p));
        let fails = FAIL_PHRASES.iter().any(|p| scrubbed.contains(p));

        let decision = match (passes, fails) {
            (true, false) => VerdictDecision::Pass,
            (false, true) => VerdictDecision::Fail,
            _ => return GateVerdict::unknown(),
        };

        GateVerdict {
            decision,
            confidence: IMPLICIT_CONFIDENCE,
            match_type: MatchType::Implicit,
            rationale: first_line(response),
        }
    }
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_pass_with_reason() {
        let v = VerdictParser::new().parse("Reviewed.\nGATE_REVIEW: PASS - all tests documented");
        assert_eq!(v.decision, VerdictDecision::Pass);
        assert_eq!(v.match_type, MatchType::Explicit);
        assert_eq!(v.confidence, 1.0);
        assert_eq!(v.rationale.as_deref(), Some("all tests documented"));
    }

    #[test]
    fn test_explicit_case_insensitive_and_verdict_alias() {
        let v = VerdictParser::new().parse("verdict: fail - missing error handling");
        assert_eq!(v.decision, VerdictDecision::Fail);
        assert_eq!(v.match_type, MatchType::Explicit);

        let v = VerdictParser::new().parse("**GATE_REVIEW:** PASS");
        assert_eq!(v.decision, VerdictDecision::Pass);
        assert!(v.rationale.is_none());
    }

    #[test]
    fn test_explicit_beats_phrases() {
        let v = VerdictParser::new().parse("Some sections are missing.\nGATE_REVIEW: PASS - acceptable");
        assert_eq!(v.decision, VerdictDecision::Pass);
    }

    #[test]
    fn test_implicit_phrases() {
        let v = VerdictParser::new().parse("I checked the output and all criteria met. No issues found.");
        assert_eq!(v.decision, VerdictDecision::Pass);
        assert_eq!(v.match_type, MatchType::Implicit);
        assert_eq!(v.confidence, IMPLICIT_CONFIDENCE);

        let v = VerdictParser::new().parse("The draft does not meet the brevity requirement.");
        assert_eq!(v.decision, VerdictDecision::Fail);
    }

    #[test]
    fn test_negated_missing_is_not_a_failure() {
        let v = VerdictParser::new().parse("Nothing is missing, all good.");
        assert_eq!(v.decision, VerdictDecision::Pass);

        let v = VerdictParser::new().parse("The summary section is missing.");
        assert_eq!(v.decision, VerdictDecision::Fail);
        assert_eq!(v.match_type, MatchType::Implicit);
    }

    #[test]
    fn test_conflicting_or_absent_is_unknown() {
        let v = VerdictParser::new().parse("Looks good overall but does not meet the style guide.");
        assert_eq!(v.decision, VerdictDecision::Unknown);
        assert!(v.counts_as_failure());

        let v = VerdictParser::new().parse("Here is the refactored function.");
        assert_eq!(v.match_type, MatchType::Unknown);
    }
}
