//! Injection decision facade
//!
//! The single entry point every injecting stage consults. Decisions are
//! cached on the request's [`ExecutionContext`], keyed by
//! `(injection type, step number, session id)`.

use crate::condition::{ConditionAction, ConditionEvaluator};
use crate::config::{InjectionConfigSet, InjectionRule};
use crate::hierarchy::{HierarchyResolver, ResolutionTarget};
use promptgate_core::{
    ExecutionContext, InjectionDecision, InjectionDecisionSource, InjectionType, Modifiers, StepContext,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Inputs to one injection decision
#[derive(Debug, Clone, Default)]
pub struct InjectionDecisionInput {
    pub modifiers: Modifiers,
    pub step: StepContext,
    pub session_id: Option<String>,
    pub chain_id: Option<String>,
    pub category: Option<String>,
}

impl InjectionDecisionInput {
    pub fn from_context(ctx: &ExecutionContext) -> Self {
        Self {
            modifiers: ctx.command().modifiers.clone(),
            step: ctx.step.clone(),
            session_id: ctx.session_id.clone(),
            chain_id: ctx.chain_id.clone(),
            category: ctx.plan.as_ref().and_then(|p| p.category.clone()),
        }
    }
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionStats {
    pub resolutions: u64,
    pub cache_hits: u64,
    pub modifier_short_circuits: u64,
    pub condition_decisions: u64,
    pub hierarchy_decisions: u64,
}

#[derive(Default)]
struct Counters {
    resolutions: AtomicU64,
    cache_hits: AtomicU64,
    modifier_short_circuits: AtomicU64,
    condition_decisions: AtomicU64,
    hierarchy_decisions: AtomicU64,
}

pub struct InjectionDecisionService {
    config: RwLock<Arc<InjectionConfigSet>>,
    runtime_overrides: RwLock<BTreeMap<InjectionType, InjectionRule>>,
    resolver: HierarchyResolver,
    evaluator: ConditionEvaluator,
    counters: Counters,
}

impl InjectionDecisionService {
    pub fn new(config: InjectionConfigSet) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            runtime_overrides: RwLock::new(BTreeMap::new()),
            resolver: HierarchyResolver::new(),
            evaluator: ConditionEvaluator::new(),
            counters: Counters::default(),
        }
    }

    /// Resolve one injection type for the request, caching on the context
    pub fn resolve(
        &self,
        ctx: &mut ExecutionContext,
        injection_type: InjectionType,
        runtime_override: Option<&InjectionRule>,
    ) -> InjectionDecision {
        let key = ctx.injection_key(injection_type);
        if let Some(cached) = ctx.decisions().injection.get(&key) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return cached.clone();
        }

        let input = InjectionDecisionInput::from_context(ctx);
        let decision = self.decide(&input, injection_type, runtime_override);
        ctx.decisions_mut().injection.insert(key, decision.clone());
        decision
    }

    /// Resolve every injection type in a fixed order
    pub fn resolve_all(&self, ctx: &mut ExecutionContext) -> Vec<InjectionDecision> {
        InjectionType::ALL
            .iter()
            .map(|t| self.resolve(ctx, *t, None))
            .collect()
    }

    /// Drop the request's cached injection decisions
    pub fn clear_cache(&self, ctx: &mut ExecutionContext) {
        ctx.decisions_mut().injection.clear();
    }

    /// Compute a decision without touching any cache
    pub fn decide(
        &self,
        input: &InjectionDecisionInput,
        injection_type: InjectionType,
        runtime_override: Option<&InjectionRule>,
    ) -> InjectionDecision {
        self.counters.resolutions.fetch_add(1, Ordering::Relaxed);
        let step_number = input.step.step_number;

        // disable beats force when both are present
        if input.modifiers.disables_injection(injection_type) {
            self.counters.modifier_short_circuits.fetch_add(1, Ordering::Relaxed);
            return InjectionDecision {
                injection_type,
                enabled: false,
                step_number,
                decided_by: InjectionDecisionSource::Modifier,
                config: None,
                reason: format!("{} disabled by modifier", injection_type),
            };
        }
        if input.modifiers.forces_injection(injection_type) {
            self.counters.modifier_short_circuits.fetch_add(1, Ordering::Relaxed);
            return InjectionDecision {
                injection_type,
                enabled: true,
                step_number,
                decided_by: InjectionDecisionSource::Modifier,
                config: None,
                reason: format!("{} forced by modifier", injection_type),
            };
        }

        let stored_override = match runtime_override {
            Some(_) => None,
            None => self.runtime_override(injection_type),
        };
        let runtime_override = runtime_override.or(stored_override.as_ref());

        let config = self.config_snapshot();
        let target = ResolutionTarget {
            chain_id: input.chain_id.as_deref(),
            category: input.category.as_deref(),
            step_number,
        };
        let resolution = self.resolver.resolve(&config, injection_type, &target, runtime_override);

        if let Some(hit) = self.evaluator.evaluate(&resolution.conditions, &input.step) {
            let enabled = match hit.action {
                ConditionAction::Inject => Some(true),
                ConditionAction::Skip => Some(false),
                ConditionAction::Inherit => None,
            };
            if let Some(enabled) = enabled {
                self.counters.condition_decisions.fetch_add(1, Ordering::Relaxed);
                let source = resolution.conditions_source.unwrap_or(resolution.config.source);
                return InjectionDecision {
                    injection_type,
                    enabled,
                    step_number,
                    decided_by: InjectionDecisionSource::Condition,
                    config: Some(resolution.config),
                    reason: format!(
                        "when clause #{} ({} level) chose {:?}",
                        hit.index + 1,
                        source,
                        hit.action
                    ),
                };
            }
        }

        self.counters.hierarchy_decisions.fetch_add(1, Ordering::Relaxed);
        let config = resolution.config;
        let fires = config.frequency.should_inject(step_number);
        let enabled = config.enabled && fires;
        let reason = if !config.enabled {
            format!("{} disabled at {} level", injection_type, config.source)
        } else if fires {
            format!("{} ({}) fires on step {}", config.frequency, config.source, step_number)
        } else {
            format!("{} ({}) skips step {}", config.frequency, config.source, step_number)
        };

        tracing::debug!(
            injection_type = %injection_type,
            step = step_number,
            enabled,
            source = %config.source,
            "injection resolved"
        );

        InjectionDecision {
            injection_type,
            enabled,
            step_number,
            decided_by: InjectionDecisionSource::Hierarchy,
            config: Some(config),
            reason,
        }
    }

    // ========================================================================
    // Control calls
    // ========================================================================

    /// Swap the configuration snapshot (hot reload)
    pub fn replace_config(&self, config: InjectionConfigSet) {
        let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(config);
    }

    pub fn config_snapshot(&self) -> Arc<InjectionConfigSet> {
        Arc::clone(&self.config.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn set_runtime_override(&self, injection_type: InjectionType, rule: InjectionRule) {
        self.runtime_overrides
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(injection_type, rule);
    }

    pub fn clear_runtime_override(&self, injection_type: InjectionType) -> Option<InjectionRule> {
        self.runtime_overrides
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&injection_type)
    }

    pub fn runtime_override(&self, injection_type: InjectionType) -> Option<InjectionRule> {
        self.runtime_overrides
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&injection_type)
            .cloned()
    }

    pub fn runtime_overrides(&self) -> BTreeMap<InjectionType, InjectionRule> {
        self.runtime_overrides.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn stats(&self) -> InjectionStats {
        InjectionStats {
            resolutions: self.counters.resolutions.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            modifier_short_circuits: self.counters.modifier_short_circuits.load(Ordering::Relaxed),
            condition_decisions: self.counters.condition_decisions.load(Ordering::Relaxed),
            hierarchy_decisions: self.counters.hierarchy_decisions.load(Ordering::Relaxed),
        }
    }
}

impl Default for InjectionDecisionService {
    fn default() -> Self {
        Self::new(InjectionConfigSet::default())
    }
}
