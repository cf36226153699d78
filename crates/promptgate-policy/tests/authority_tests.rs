//! Decision authority behaviour across requests.

use promptgate_core::{
    ClientSelection, ExecutionContext, FrameworkSource, GateAction, GateOutcome, ParsedCommand, ReviewStatus,
};
use promptgate_policy::{
    FileSessionStore, FrameworkDecisionAuthority, FrameworkDecisionInput, FrameworkSnapshot, GateEnforcementAuthority,
    GateEnforcementInput, GateSettings, RetryConfig, SessionStore,
};

#[test]
fn test_client_selection_scenario() {
    let authority = FrameworkDecisionAuthority::new();
    let command = ParsedCommand::single("explain").with_client_selection(ClientSelection::framework("socratic"));
    let mut ctx = ExecutionContext::new(command);

    let input = FrameworkDecisionInput::from_context(&ctx, FrameworkSnapshot::active("default"));
    let decision = authority.decide(&mut ctx, &input);

    assert!(decision.should_apply);
    assert_eq!(decision.framework_id.as_deref(), Some("socratic"));
    assert_eq!(decision.source, FrameworkSource::ClientSelection);
}

#[test]
fn test_overlapping_requests_decide_independently() {
    let authority = FrameworkDecisionAuthority::new();
    let snapshot = FrameworkSnapshot::active("default");

    let mut plain = ExecutionContext::new(ParsedCommand::single("a"));
    let mut overridden = ExecutionContext::new(ParsedCommand::single("b").with_framework_override("react"));

    let plain_input = FrameworkDecisionInput::from_context(&plain, snapshot.clone());
    let overridden_input = FrameworkDecisionInput::from_context(&overridden, snapshot);

    let a = authority.decide(&mut plain, &plain_input);
    let b = authority.decide(&mut overridden, &overridden_input);

    assert_eq!(a.framework_id.as_deref(), Some("default"));
    assert_eq!(b.framework_id.as_deref(), Some("react"));
    assert_eq!(authority.resolution_count(), 2);
}

/// Drive a review across independent requests through a file-backed store
#[test]
fn test_review_survives_across_requests() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(dir.path());
    let authority = GateEnforcementAuthority::new();
    let gates = vec!["accuracy".to_string()];

    let request = |verdict: Option<&str>| {
        let mut input = GateEnforcementInput::new("flow-7", gates.clone())
            .retry(RetryConfig::new(1))
            .review(store.load("flow-7").unwrap())
            .review_prompt("Verify all figures");
        input.verdict = verdict.map(str::to_string);

        let mut ctx = ExecutionContext::new(ParsedCommand::single("report"));
        let decision = authority.decide(&mut ctx, &input);
        match &decision.review {
            Some(review) if !review.is_resolved() => store.save("flow-7", review).unwrap(),
            _ => store.clear("flow-7").unwrap(),
        }
        decision
    };

    let first = request(None);
    assert_eq!(first.action, GateAction::InjectReviewPrompt);
    assert_eq!(store.load("flow-7").unwrap().unwrap().status, ReviewStatus::Injected);

    let second = request(Some("GATE_REVIEW: FAIL - totals wrong"));
    assert_eq!(second.action, GateAction::RetryWithFeedback);

    let third = request(Some("GATE_REVIEW: FAIL - still wrong"));
    assert_eq!(third.action, GateAction::AbortChain);
    assert_eq!(third.outcome, Some(GateOutcome::Exhausted));
    assert!(store.load("flow-7").unwrap().is_none());

    // the next request opens a fresh cycle
    let fourth = request(None);
    assert_eq!(fourth.action, GateAction::InjectReviewPrompt);
    assert_eq!(fourth.attempt, 0);
}

#[test]
fn test_gate_settings_yaml() {
    let yaml = r#"
enforcement_mode: advisory
retry: { max_attempts: 2, on_exhaustion: skip }
definitions:
  - id: security
    criteria: ["no credentials in output"]
    retry: { max_attempts: 1 }
"#;
    let settings: GateSettings = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(settings.retry.max_attempts, 2);
    assert_eq!(settings.definitions[0].retry, Some(RetryConfig::new(1)));
}
