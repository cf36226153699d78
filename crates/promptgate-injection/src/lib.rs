//! promptgate Injection: which content gets injected into which step
//!
//! # Architecture
//!
//! ```text
//! resolve(type, input)
//!     │
//!     ├─ modifier disable/force ──────────────→ decision (short-circuit)
//!     │
//!     ├─ HierarchyResolver
//!     │     runtime → step → chain → category → global → system default
//!     │
//!     ├─ ConditionEvaluator (first matching `when` clause)
//!     │     inject / skip → decision     inherit → fall through
//!     │
//!     └─ enabled && frequency(step) ──────────→ decision
//! ```
//!
//! # Example
//!
//! ```
//! use promptgate_core::{ExecutionContext, InjectionType, ParsedCommand};
//! use promptgate_injection::{InjectionConfigSet, InjectionDecisionService};
//!
//! let service = InjectionDecisionService::new(InjectionConfigSet::default());
//! let mut ctx = ExecutionContext::new(ParsedCommand::single("summarize"));
//!
//! let decision = service.resolve(&mut ctx, InjectionType::SystemPrompt, None);
//! assert!(decision.enabled);
//! ```

pub mod condition;
pub mod config;
pub mod hierarchy;
pub mod service;

pub use condition::{ChainPosition, Comparison, Condition, ConditionAction, ConditionEvaluator, WhenClause};
pub use config::{InjectionConfigSet, InjectionRule, StepRule, StepTarget, TypeRules};
pub use hierarchy::{match_chain_pattern, HierarchyResolution, HierarchyResolver, PatternKind, PatternMatch, ResolutionTarget};
pub use service::{InjectionDecisionInput, InjectionDecisionService, InjectionStats};
