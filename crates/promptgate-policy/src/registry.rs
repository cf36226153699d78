//! Gate registry
//!
//! Configured gates are permanent. Inline gates declared on a command are
//! registered under the request's scope id and dropped when that scope is
//! cleaned up.

use crate::gate::RetryConfig;
use promptgate_core::InlineGate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// A named quality check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Pass criteria, one per line in the review prompt
    #[serde(default)]
    pub criteria: Vec<String>,
    /// Guidance text injected before the step runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
    /// Per-gate retry policy; overrides the global one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

impl GateDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            criteria: Vec::new(),
            guidance: None,
            retry: None,
        }
    }

    pub fn with_criterion(mut self, criterion: impl Into<String>) -> Self {
        self.criteria.push(criterion.into());
        self
    }

    pub fn with_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.guidance = Some(guidance.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Gate ids split into known definitions and unknown ids
#[derive(Debug, Clone, Default)]
pub struct ResolvedGates {
    pub definitions: Vec<GateDefinition>,
    pub missing: Vec<String>,
}

#[derive(Debug, Default)]
pub struct GateRegistry {
    permanent: RwLock<BTreeMap<String, GateDefinition>>,
    /// scope id → gate id → definition
    temporary: RwLock<BTreeMap<String, BTreeMap<String, GateDefinition>>>,
}

impl GateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definitions(definitions: impl IntoIterator<Item = GateDefinition>) -> Self {
        let registry = Self::new();
        for definition in definitions {
            registry.register(definition);
        }
        registry
    }

    pub fn register(&self, definition: GateDefinition) {
        self.permanent
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(definition.id.clone(), definition);
    }

    /// Register an inline gate under a scope and return its id
    pub fn register_temporary(&self, scope: &str, gate: &InlineGate) -> String {
        let mut temporary = self.temporary.write().unwrap_or_else(|e| e.into_inner());
        let scoped = temporary.entry(scope.to_string()).or_default();

        let id = match &gate.id {
            Some(id) => id.clone(),
            None => {
                let mut n = scoped.len() + 1;
                while scoped.contains_key(&format!("inline-{}", n)) {
                    n += 1;
                }
                format!("inline-{}", n)
            }
        };

        let mut definition = GateDefinition::new(id.clone());
        definition.name = format!("Inline gate {}", id);
        definition.criteria = gate.criteria.clone();
        scoped.insert(id.clone(), definition);

        tracing::debug!(scope, gate_id = %id, "registered inline gate");
        id
    }

    /// Drop every temporary gate of a scope; returns how many were removed
    pub fn cleanup_scope(&self, scope: &str) -> usize {
        let removed = self
            .temporary
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(scope)
            .map(|gates| gates.len())
            .unwrap_or(0);
        if removed > 0 {
            tracing::debug!(scope, removed, "released inline gates");
        }
        removed
    }

    pub fn temporary_count(&self, scope: &str) -> usize {
        self.temporary
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(scope)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Look up a gate, preferring the scope's temporary registrations
    pub fn get(&self, scope: Option<&str>, id: &str) -> Option<GateDefinition> {
        if let Some(scope) = scope {
            let temporary = self.temporary.read().unwrap_or_else(|e| e.into_inner());
            if let Some(found) = temporary.get(scope).and_then(|gates| gates.get(id)) {
                return Some(found.clone());
            }
        }
        self.permanent
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn resolve(&self, scope: Option<&str>, ids: &[String]) -> ResolvedGates {
        let mut resolved = ResolvedGates::default();
        for id in ids {
            match self.get(scope, id) {
                Some(definition) => resolved.definitions.push(definition),
                None => resolved.missing.push(id.clone()),
            }
        }
        resolved
    }

    pub fn ids(&self) -> Vec<String> {
        self.permanent
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_gates_are_scoped() {
        let registry = GateRegistry::from_definitions([GateDefinition::new("code-quality")]);

        let a = registry.register_temporary("scope-a", &InlineGate::new("cite sources"));
        let b = registry.register_temporary("scope-a", &InlineGate::new("under 200 words"));
        let named = registry.register_temporary("scope-b", &InlineGate::named("tone", "formal tone"));

        assert_eq!(a, "inline-1");
        assert_eq!(b, "inline-2");
        assert_eq!(named, "tone");
        assert_eq!(registry.temporary_count("scope-a"), 2);

        assert!(registry.get(Some("scope-a"), "inline-1").is_some());
        assert!(registry.get(Some("scope-b"), "inline-1").is_none());
        assert!(registry.get(Some("scope-b"), "code-quality").is_some());

        assert_eq!(registry.cleanup_scope("scope-a"), 2);
        assert_eq!(registry.temporary_count("scope-a"), 0);
        assert_eq!(registry.temporary_count("scope-b"), 1);
        assert_eq!(registry.cleanup_scope("scope-a"), 0);
    }

    #[test]
    fn test_resolve_reports_missing() {
        let registry = GateRegistry::from_definitions([GateDefinition::new("security")]);
        let resolved = registry.resolve(None, &["security".to_string(), "ghost".to_string()]);
        assert_eq!(resolved.definitions.len(), 1);
        assert_eq!(resolved.missing, vec!["ghost".to_string()]);
    }
}
