//! Framework decision authority
//!
//! Decides once per request whether a framework applies and which one.
//!
//! ```text
//! disable modifier → operator override → client selection → global active
//!   (first applicable wins; nothing applicable = no framework)
//! ```

use chrono::Utc;
use promptgate_core::{ClientSelection, ExecutionContext, FrameworkDecision, FrameworkSource, Modifiers};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Framework state passed in explicitly with every decision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkSnapshot {
    /// System-wide framework switch
    #[serde(default)]
    pub enabled: bool,
    /// Currently active framework id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,
    /// Known framework ids; empty means any id is accepted
    #[serde(default)]
    pub available: Vec<String>,
}

impl FrameworkSnapshot {
    pub fn active(id: impl Into<String>) -> Self {
        Self {
            enabled: true,
            active: Some(id.into()),
            available: Vec::new(),
        }
    }

    pub fn with_available<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Canonical id for a requested framework, matched case-insensitively
    pub fn canonical(&self, requested: &str) -> Option<String> {
        let requested = requested.trim();
        if requested.is_empty() {
            return None;
        }
        if self.available.is_empty() {
            return Some(requested.to_string());
        }
        self.available
            .iter()
            .find(|id| id.eq_ignore_ascii_case(requested))
            .cloned()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameworkDecisionInput {
    pub modifiers: Modifiers,
    pub framework_override: Option<String>,
    pub client_selection: Option<ClientSelection>,
    pub snapshot: FrameworkSnapshot,
}

impl FrameworkDecisionInput {
    pub fn from_context(ctx: &ExecutionContext, snapshot: FrameworkSnapshot) -> Self {
        Self {
            modifiers: ctx.command().modifiers.clone(),
            framework_override: ctx.command().framework_override.clone(),
            client_selection: ctx.client_selection.clone(),
            snapshot,
        }
    }
}

/// Single source of truth for framework decisions
#[derive(Debug, Default)]
pub struct FrameworkDecisionAuthority {
    resolutions: AtomicU64,
}

impl FrameworkDecisionAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide for this request.
    ///
    /// The first call computes and caches the decision on the context; later
    /// calls return the cached record whatever the input.
    pub fn decide(&self, ctx: &mut ExecutionContext, input: &FrameworkDecisionInput) -> FrameworkDecision {
        if let Some(cached) = ctx.framework_decision() {
            return cached.clone();
        }

        let decision = self.resolve(input);
        tracing::debug!(
            request_id = %ctx.request_id,
            should_apply = decision.should_apply,
            framework = decision.framework_id.as_deref().unwrap_or("-"),
            source = ?decision.source,
            "framework decided"
        );
        ctx.decisions_mut().framework = Some(decision.clone());
        decision
    }

    pub fn has_decided(&self, ctx: &ExecutionContext) -> bool {
        ctx.framework_decision().is_some()
    }

    pub fn cached_decision<'a>(&self, ctx: &'a ExecutionContext) -> Option<&'a FrameworkDecision> {
        ctx.framework_decision()
    }

    /// Forget the cached decision (reprocessing only)
    pub fn reset(&self, ctx: &mut ExecutionContext) {
        ctx.decisions_mut().framework = None;
    }

    /// Number of uncached resolutions performed
    pub fn resolution_count(&self) -> u64 {
        self.resolutions.load(Ordering::Relaxed)
    }

    fn resolve(&self, input: &FrameworkDecisionInput) -> FrameworkDecision {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        let mut skipped = Vec::new();

        if input.modifiers.disable_framework {
            return decision(false, None, FrameworkSource::ModifierDisabled, "framework disabled by modifier");
        }

        if let Some(requested) = input.framework_override.as_deref() {
            match input.snapshot.canonical(requested) {
                Some(id) => {
                    let reason = format!("operator override selected {}", id);
                    return decision(true, Some(id), FrameworkSource::OperatorOverride, reason);
                }
                None => skipped.push(format!("unknown override '{}'", requested)),
            }
        }

        if let Some(requested) = input.client_selection.as_ref().and_then(|s| s.framework.as_deref()) {
            match input.snapshot.canonical(requested) {
                Some(id) => {
                    let reason = format!("client selected {}", id);
                    return decision(true, Some(id), FrameworkSource::ClientSelection, reason);
                }
                None => skipped.push(format!("unknown client selection '{}'", requested)),
            }
        }

        let suffix = if skipped.is_empty() {
            String::new()
        } else {
            format!(" ({})", skipped.join("; "))
        };

        match (&input.snapshot.active, input.snapshot.enabled) {
            (Some(active), true) => decision(
                true,
                Some(active.clone()),
                FrameworkSource::GlobalActive,
                format!("global active framework {}{}", active, suffix),
            ),
            _ => decision(
                false,
                None,
                FrameworkSource::GlobalActive,
                format!("no framework active{}", suffix),
            ),
        }
    }
}

fn decision(
    should_apply: bool,
    framework_id: Option<String>,
    source: FrameworkSource,
    reason: impl Into<String>,
) -> FrameworkDecision {
    FrameworkDecision {
        should_apply,
        framework_id,
        source,
        reason: reason.into(),
        decided_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptgate_core::ParsedCommand;

    fn input() -> FrameworkDecisionInput {
        FrameworkDecisionInput {
            snapshot: FrameworkSnapshot::active("default").with_available(["default", "socratic", "CAGEERF"]),
            ..Default::default()
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(ParsedCommand::single("p"))
    }

    #[test]
    fn test_modifier_always_wins() {
        let authority = FrameworkDecisionAuthority::new();
        let mut i = input();
        i.modifiers.disable_framework = true;
        i.framework_override = Some("socratic".to_string());
        i.client_selection = Some(ClientSelection::framework("socratic"));

        let d = authority.decide(&mut ctx(), &i);
        assert!(!d.should_apply);
        assert_eq!(d.source, FrameworkSource::ModifierDisabled);
        assert!(d.framework_id.is_none());
    }

    #[test]
    fn test_override_beats_client_selection() {
        let authority = FrameworkDecisionAuthority::new();
        let mut i = input();
        i.framework_override = Some("cageerf".to_string());
        i.client_selection = Some(ClientSelection::framework("socratic"));

        let d = authority.decide(&mut ctx(), &i);
        assert_eq!(d.source, FrameworkSource::OperatorOverride);
        assert_eq!(d.framework_id.as_deref(), Some("CAGEERF"));
    }

    #[test]
    fn test_unknown_override_falls_through() {
        let authority = FrameworkDecisionAuthority::new();
        let mut i = input();
        i.framework_override = Some("nonexistent".to_string());

        let d = authority.decide(&mut ctx(), &i);
        assert_eq!(d.source, FrameworkSource::GlobalActive);
        assert_eq!(d.framework_id.as_deref(), Some("default"));
        assert!(d.reason.contains("unknown override"));
    }

    #[test]
    fn test_nothing_applicable() {
        let authority = FrameworkDecisionAuthority::new();
        let d = authority.decide(&mut ctx(), &FrameworkDecisionInput::default());
        assert!(!d.should_apply);
        assert_eq!(d.source, FrameworkSource::GlobalActive);
        assert!(d.framework_id.is_none());
    }

    #[test]
    fn test_disabled_snapshot_ignores_active() {
        let authority = FrameworkDecisionAuthority::new();
        let mut i = input();
        i.snapshot.enabled = false;
        assert!(!authority.decide(&mut ctx(), &i).should_apply);
    }

    #[test]
    fn test_memoized_per_context() {
        let authority = FrameworkDecisionAuthority::new();
        let mut c = ctx();

        let first = authority.decide(&mut c, &input());
        let mut changed = input();
        changed.modifiers.disable_framework = true;
        let second = authority.decide(&mut c, &changed);

        assert_eq!(first, second);
        assert_eq!(authority.resolution_count(), 1);
        assert!(authority.has_decided(&c));

        authority.reset(&mut c);
        assert!(authority.cached_decision(&c).is_none());
        authority.decide(&mut c, &changed);
        assert_eq!(authority.resolution_count(), 2);
    }
}
