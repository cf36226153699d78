//! promptgate Policy: Decision Authorities for Frameworks and Gates
//!
//! The framework authority decides once per request which behavioral
//! framework applies. The gate authority owns the review/retry state machine
//! that can suspend a chain until the calling agent returns a verdict.
//!
//! # Gate Review Cycle
//!
//! ```text
//! request N:   gates → authority → inject-review-prompt ──save──▶ SessionStore
//! request N+1: SessionStore ──load──▶ authority + verdict → continue | retry-with-feedback | abort-chain
//! ```
//!
//! # Example
//!
//! ```
//! use promptgate_core::{ExecutionContext, GateAction, ParsedCommand};
//! use promptgate_policy::{GateEnforcementAuthority, GateEnforcementInput};
//!
//! let authority = GateEnforcementAuthority::new();
//! let mut ctx = ExecutionContext::new(ParsedCommand::single("summarize"));
//! let input = GateEnforcementInput::new("session-1", vec!["brevity".to_string()])
//!     .review_prompt("Is the summary under 100 words?");
//!
//! let decision = authority.decide(&mut ctx, &input);
//! assert_eq!(decision.action, GateAction::InjectReviewPrompt);
//! ```

pub mod framework;
pub mod gate;
pub mod registry;
pub mod session;
pub mod verdict;

pub use framework::{FrameworkDecisionAuthority, FrameworkDecisionInput, FrameworkSnapshot};
pub use gate::{
    compose_review_prompt, ExhaustionAction, GateEnforcementAuthority, GateEnforcementInput, GateSettings,
    RetryConfig, REVIEW_INSTRUCTION,
};
pub use registry::{GateDefinition, GateRegistry, ResolvedGates};
pub use session::{FileSessionStore, InMemorySessionStore, SessionStore, StoreError};
pub use verdict::{VerdictParser, IMPLICIT_CONFIDENCE};
