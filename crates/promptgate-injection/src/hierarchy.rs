//! Hierarchical configuration resolution
//!
//! Levels, most specific first:
//!
//! ```text
//! runtime override → step → chain (exact > prefix-* > *-suffix > *contains*) → category → global → system default
//! ```
//!
//! Resolution starts from the system default and overlays each level from
//! the most general to the most specific, so unset fields inherit.

use crate::condition::WhenClause;
use crate::config::{InjectionConfigSet, InjectionRule, TypeRules};
use promptgate_core::{HierarchyLevel, InjectionType, ResolvedInjectionConfig};
use std::cmp::Reverse;

/// What is being resolved for
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolutionTarget<'a> {
    pub chain_id: Option<&'a str>,
    pub category: Option<&'a str>,
    pub step_number: u32,
}

/// Result of walking the hierarchy for one injection type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyResolution {
    pub config: ResolvedInjectionConfig,
    /// `when` clauses of the most specific level that defines any
    pub conditions: Vec<WhenClause>,
    pub conditions_source: Option<HierarchyLevel>,
    /// Chain pattern that supplied the chain level, if any
    pub chain_pattern: Option<String>,
}

/// Kind of chain pattern, most specific first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PatternKind {
    Exact,
    Prefix,
    Suffix,
    Contains,
    Wildcard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternMatch {
    pub kind: PatternKind,
    /// Literal characters in the pattern; longer is more specific
    pub literal_len: usize,
}

/// Match a chain id against an exact id or glob pattern
pub fn match_chain_pattern(pattern: &str, chain_id: &str) -> Option<PatternMatch> {
    let literal_len = pattern.chars().filter(|c| *c != '*').count();
    let hit = |kind| Some(PatternMatch { kind, literal_len });

    if !pattern.contains('*') {
        return if pattern == chain_id { hit(PatternKind::Exact) } else { None };
    }
    if pattern.chars().all(|c| c == '*') {
        return hit(PatternKind::Wildcard);
    }

    let leading = pattern.starts_with('*');
    let trailing = pattern.ends_with('*');
    let core = pattern.trim_matches('*');

    match (leading, trailing) {
        (true, true) => chain_id.contains(core).then_some(PatternMatch {
            kind: PatternKind::Contains,
            literal_len,
        }),
        (false, true) => chain_id.starts_with(core).then_some(PatternMatch {
            kind: PatternKind::Prefix,
            literal_len,
        }),
        (true, false) => chain_id.ends_with(core).then_some(PatternMatch {
            kind: PatternKind::Suffix,
            literal_len,
        }),
        (false, false) => {
            // interior star: anchored at both ends
            let (head, tail) = pattern.split_once('*').unwrap_or((pattern, ""));
            let tail = tail.trim_start_matches('*');
            let fits = chain_id.len() >= head.len() + tail.len()
                && chain_id.starts_with(head)
                && chain_id.ends_with(tail);
            fits.then_some(PatternMatch {
                kind: PatternKind::Prefix,
                literal_len,
            })
        }
    }
}

/// Walks the configuration hierarchy
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchyResolver;

impl HierarchyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve exactly one configuration for an injection type and step
    pub fn resolve(
        &self,
        config: &InjectionConfigSet,
        injection_type: InjectionType,
        target: &ResolutionTarget<'_>,
        runtime_override: Option<&InjectionRule>,
    ) -> HierarchyResolution {
        let mut resolution = HierarchyResolution {
            config: ResolvedInjectionConfig::system_default(injection_type),
            conditions: Vec::new(),
            conditions_source: None,
            chain_pattern: None,
        };

        let lookup = |rules: &TypeRules| rules.get(&injection_type).cloned();

        let global = lookup(&config.global);
        let category = target
            .category
            .and_then(|c| config.categories.get(c))
            .and_then(lookup);
        let chain = target.chain_id.and_then(|id| self.best_chain_match(config, id, injection_type));
        let step = self.step_rule(config, injection_type, target);

        // general → specific
        Self::overlay(&mut resolution, HierarchyLevel::Global, global.as_ref());
        Self::overlay(&mut resolution, HierarchyLevel::Category, category.as_ref());
        if let Some((pattern, rule)) = &chain {
            if Self::overlay(&mut resolution, HierarchyLevel::Chain, Some(rule)) {
                resolution.chain_pattern = Some(pattern.clone());
            }
        }
        Self::overlay(&mut resolution, HierarchyLevel::Step, step.as_ref());
        Self::overlay(&mut resolution, HierarchyLevel::RuntimeOverride, runtime_override);

        resolution
    }

    /// Apply a partial rule; returns whether it contributed anything
    fn overlay(resolution: &mut HierarchyResolution, level: HierarchyLevel, rule: Option<&InjectionRule>) -> bool {
        let Some(rule) = rule else {
            return false;
        };
        if rule.is_empty() {
            return false;
        }
        if let Some(enabled) = rule.enabled {
            resolution.config.enabled = enabled;
        }
        if let Some(frequency) = rule.frequency {
            resolution.config.frequency = frequency;
        }
        if !rule.when.is_empty() {
            resolution.conditions = rule.when.clone();
            resolution.conditions_source = Some(level);
        }
        resolution.config.source = level;
        true
    }

    /// Most specific chain pattern that matches and defines this type.
    ///
    /// Ties break on longer literal text, then on the pattern string, so the
    /// result never depends on storage order.
    fn best_chain_match(
        &self,
        config: &InjectionConfigSet,
        chain_id: &str,
        injection_type: InjectionType,
    ) -> Option<(String, InjectionRule)> {
        config
            .chains
            .iter()
            .filter_map(|(pattern, rules)| {
                let rule = rules.get(&injection_type)?;
                let hit = match_chain_pattern(pattern, chain_id)?;
                Some((hit, pattern, rule))
            })
            .min_by_key(|(hit, pattern, _)| (hit.kind, Reverse(hit.literal_len), pattern.as_str()))
            .map(|(_, pattern, rule)| (pattern.clone(), rule.clone()))
    }

    /// Step rule for the exact step; chain-scoped targets beat unscoped ones
    fn step_rule(
        &self,
        config: &InjectionConfigSet,
        injection_type: InjectionType,
        target: &ResolutionTarget<'_>,
    ) -> Option<InjectionRule> {
        let matching = || {
            config
                .steps
                .iter()
                .filter(|s| s.target.matches(target.chain_id, target.step_number))
        };
        matching()
            .find(|s| s.target.chain_id.is_some() && s.rules.contains_key(&injection_type))
            .or_else(|| matching().find(|s| s.rules.contains_key(&injection_type)))
            .and_then(|s| s.rules.get(&injection_type).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StepTarget;
    use promptgate_core::Frequency;

    fn target<'a>(chain: Option<&'a str>, category: Option<&'a str>, step: u32) -> ResolutionTarget<'a> {
        ResolutionTarget {
            chain_id: chain,
            category,
            step_number: step,
        }
    }

    #[test]
    fn test_pattern_kinds() {
        assert_eq!(match_chain_pattern("analysis-flow", "analysis-flow").unwrap().kind, PatternKind::Exact);
        assert_eq!(match_chain_pattern("analysis-*", "analysis-flow").unwrap().kind, PatternKind::Prefix);
        assert!(match_chain_pattern("analysis-*", "flow-analysis").is_none());
        assert_eq!(match_chain_pattern("*-analysis", "flow-analysis").unwrap().kind, PatternKind::Suffix);
        assert_eq!(match_chain_pattern("*ana*", "flow-analysis").unwrap().kind, PatternKind::Contains);
        assert_eq!(match_chain_pattern("*", "anything").unwrap().kind, PatternKind::Wildcard);
        assert!(match_chain_pattern("a*z", "abcz").is_some());
        assert!(match_chain_pattern("ab*ba", "aba").is_none());
    }

    #[test]
    fn test_system_default_when_unconfigured() {
        let r = HierarchyResolver::new().resolve(
            &InjectionConfigSet::new(),
            InjectionType::SystemPrompt,
            &target(None, None, 1),
            None,
        );
        assert_eq!(r.config, ResolvedInjectionConfig::system_default(InjectionType::SystemPrompt));
        assert_eq!(r.config.frequency, Frequency::EveryNSteps { n: 2 });
    }

    #[test]
    fn test_partial_merge_inherits_unset_fields() {
        let config = InjectionConfigSet::new()
            .with_global(
                InjectionType::SystemPrompt,
                InjectionRule::new().frequency(Frequency::EveryNSteps { n: 4 }),
            )
            .with_category("analysis", InjectionType::SystemPrompt, InjectionRule::new().enabled(false));

        let r = HierarchyResolver::new().resolve(
            &config,
            InjectionType::SystemPrompt,
            &target(None, Some("analysis"), 1),
            None,
        );
        assert!(!r.config.enabled);
        assert_eq!(r.config.frequency, Frequency::EveryNSteps { n: 4 });
        assert_eq!(r.config.source, HierarchyLevel::Category);
    }

    #[test]
    fn test_exact_beats_glob() {
        let config = InjectionConfigSet::new()
            .with_chain("analysis-*", InjectionType::StyleGuidance, InjectionRule::new().enabled(false))
            .with_chain("analysis-flow", InjectionType::StyleGuidance, InjectionRule::new().frequency(Frequency::EveryStep));

        let r = HierarchyResolver::new().resolve(
            &config,
            InjectionType::StyleGuidance,
            &target(Some("analysis-flow"), None, 3),
            None,
        );
        assert_eq!(r.chain_pattern.as_deref(), Some("analysis-flow"));
        assert!(r.config.enabled);
        assert_eq!(r.config.frequency, Frequency::EveryStep);
    }

    #[test]
    fn test_prefix_beats_suffix_beats_contains() {
        let config = InjectionConfigSet::new()
            .with_chain("*flow*", InjectionType::GateGuidance, InjectionRule::new().enabled(true))
            .with_chain("*-flow", InjectionType::GateGuidance, InjectionRule::new().enabled(true))
            .with_chain("analysis-*", InjectionType::GateGuidance, InjectionRule::new().enabled(true));
        let resolver = HierarchyResolver::new();

        let r = resolver.resolve(&config, InjectionType::GateGuidance, &target(Some("analysis-flow"), None, 1), None);
        assert_eq!(r.chain_pattern.as_deref(), Some("analysis-*"));

        let r = resolver.resolve(&config, InjectionType::GateGuidance, &target(Some("review-flow"), None, 1), None);
        assert_eq!(r.chain_pattern.as_deref(), Some("*-flow"));

        let r = resolver.resolve(&config, InjectionType::GateGuidance, &target(Some("flowchart"), None, 1), None);
        assert_eq!(r.chain_pattern.as_deref(), Some("*flow*"));
    }

    #[test]
    fn test_longer_literal_wins_within_kind() {
        let config = InjectionConfigSet::new()
            .with_chain("an*", InjectionType::GateGuidance, InjectionRule::new().enabled(false))
            .with_chain("analysis-*", InjectionType::GateGuidance, InjectionRule::new().enabled(true));
        let r = HierarchyResolver::new().resolve(
            &config,
            InjectionType::GateGuidance,
            &target(Some("analysis-flow"), None, 1),
            None,
        );
        assert_eq!(r.chain_pattern.as_deref(), Some("analysis-*"));
        assert!(r.config.enabled);
    }

    #[test]
    fn test_runtime_override_is_most_specific() {
        let config = InjectionConfigSet::new().with_step(
            StepTarget { chain_id: None, step: 1 },
            InjectionType::SystemPrompt,
            InjectionRule::new().enabled(true),
        );
        let runtime = InjectionRule::new().enabled(false);
        let r = HierarchyResolver::new().resolve(
            &config,
            InjectionType::SystemPrompt,
            &target(None, None, 1),
            Some(&runtime),
        );
        assert!(!r.config.enabled);
        assert_eq!(r.config.source, HierarchyLevel::RuntimeOverride);
    }

    #[test]
    fn test_chain_scoped_step_rule_beats_unscoped() {
        let config = InjectionConfigSet::new()
            .with_step(
                StepTarget { chain_id: None, step: 2 },
                InjectionType::SystemPrompt,
                InjectionRule::new().enabled(true),
            )
            .with_step(
                StepTarget { chain_id: Some("flow".to_string()), step: 2 },
                InjectionType::SystemPrompt,
                InjectionRule::new().enabled(false),
            );
        let r = HierarchyResolver::new().resolve(
            &config,
            InjectionType::SystemPrompt,
            &target(Some("flow"), None, 2),
            None,
        );
        assert!(!r.config.enabled);
        assert_eq!(r.config.source, HierarchyLevel::Step);
    }
}
