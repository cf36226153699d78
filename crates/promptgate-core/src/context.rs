//! Execution Context: per-request state shared by every stage
//!
//! Created once per inbound request and exclusively owned by the pipeline.
//! Decision authorities cache their results here, never in process-wide
//! state, so two overlapping requests cannot observe each other's decisions.

use crate::command::{ClientSelection, ParsedCommand};
use crate::data_model::{
    FrameworkDecision, GateEnforcementDecision, InjectedFragment, InjectionDecision, InjectionType,
    PipelineResponse,
};
use crate::diagnostics::{DiagnosticEntry, DiagnosticLevel, DiagnosticsLog};
use crate::plan::ExecutionPlan;
use crate::review::PendingGateReview;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Function invoked exactly once when the request ends
pub type CleanupHandler = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

struct CleanupEntry {
    name: String,
    handler: CleanupHandler,
}

/// Outcome of the previous chain step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepResult {
    Success,
    Failure,
    Skipped,
}

/// Gate state of the current step as seen by condition clauses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    #[default]
    None,
    Pending,
    Passed,
    Failed,
}

/// Position of the current step within its chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContext {
    /// 1-based
    pub step_number: u32,
    pub total_steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_result: Option<StepResult>,
    #[serde(default)]
    pub gate_status: GateStatus,
}

impl StepContext {
    pub fn new(step_number: u32, total_steps: u32) -> Self {
        Self {
            step_number: step_number.max(1),
            total_steps: total_steps.max(1),
            ..Default::default()
        }
    }

    pub fn is_first(&self) -> bool {
        self.step_number <= 1
    }

    pub fn is_last(&self) -> bool {
        self.step_number >= self.total_steps
    }
}

/// Cache key for injection decisions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InjectionCacheKey {
    pub injection_type: InjectionType,
    pub step_number: u32,
    pub session_id: Option<String>,
}

/// Per-authority decisions, computed at most once per request
#[derive(Debug, Clone, Default)]
pub struct DecisionCache {
    pub framework: Option<FrameworkDecision>,
    pub injection: HashMap<InjectionCacheKey, InjectionDecision>,
    pub gate: Option<GateEnforcementDecision>,
}

pub struct ExecutionContext {
    pub request_id: String,
    pub received_at: DateTime<Utc>,
    command: ParsedCommand,
    pub plan: Option<ExecutionPlan>,
    pub session_id: Option<String>,
    pub chain_id: Option<String>,
    scope_id: Option<String>,
    pub step: StepContext,
    pub client_selection: Option<ClientSelection>,
    /// Review loaded from the session store for this request
    pub pending_review: Option<PendingGateReview>,
    pub injections: Vec<InjectedFragment>,
    pub response: Option<PipelineResponse>,
    pub metadata: HashMap<String, Value>,
    decisions: DecisionCache,
    diagnostics: DiagnosticsLog,
    cleanup: Vec<CleanupEntry>,
    current_stage: Option<String>,
}

impl ExecutionContext {
    pub fn new(command: ParsedCommand) -> Self {
        let mut step = StepContext::new(command.current_step.unwrap_or(1), command.total_steps());
        step.step_type = command.step_type(step.step_number).map(str::to_string);
        step.previous_result = command.previous_result;

        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            received_at: Utc::now(),
            session_id: command.session_id.clone(),
            chain_id: command.chain_id.clone(),
            client_selection: command.client_selection.clone(),
            command,
            plan: None,
            scope_id: None,
            step,
            pending_review: None,
            injections: Vec::new(),
            response: None,
            metadata: HashMap::new(),
            decisions: DecisionCache::default(),
            diagnostics: DiagnosticsLog::new(),
            cleanup: Vec::new(),
            current_stage: None,
        }
    }

    pub fn command(&self) -> &ParsedCommand {
        &self.command
    }

    // ========================================================================
    // Scope
    // ========================================================================

    /// Establish the execution scope id.
    ///
    /// Derived from the resume session id, then the chain id, then a fresh
    /// id. Only the first call has any effect.
    pub fn establish_scope(&mut self) -> &str {
        if self.scope_id.is_none() {
            let scope = self
                .session_id
                .clone()
                .or_else(|| self.chain_id.clone())
                .unwrap_or_else(|| format!("exec-{}", uuid::Uuid::new_v4()));
            self.scope_id = Some(scope);
        }
        self.scope_id.as_deref().unwrap_or_default()
    }

    pub fn scope_id(&self) -> Option<&str> {
        self.scope_id.as_deref()
    }

    // ========================================================================
    // Decisions
    // ========================================================================

    pub fn decisions(&self) -> &DecisionCache {
        &self.decisions
    }

    pub fn decisions_mut(&mut self) -> &mut DecisionCache {
        &mut self.decisions
    }

    pub fn framework_decision(&self) -> Option<&FrameworkDecision> {
        self.decisions.framework.as_ref()
    }

    pub fn gate_decision(&self) -> Option<&GateEnforcementDecision> {
        self.decisions.gate.as_ref()
    }

    pub fn injection_key(&self, injection_type: InjectionType) -> InjectionCacheKey {
        InjectionCacheKey {
            injection_type,
            step_number: self.step.step_number,
            session_id: self.session_id.clone(),
        }
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Stage currently executing (set by the runner)
    pub fn current_stage(&self) -> &str {
        self.current_stage.as_deref().unwrap_or("pipeline")
    }

    pub fn enter_stage(&mut self, stage: &str) {
        self.current_stage = Some(stage.to_string());
    }

    pub fn exit_stage(&mut self) {
        self.current_stage = None;
    }

    /// Record a diagnostic attributed to the current stage
    pub fn diagnose(&mut self, level: DiagnosticLevel, message: impl Into<String>) {
        let entry = DiagnosticEntry::new(level, self.current_stage().to_string(), message);
        self.diagnostics.push(entry);
    }

    /// Record a diagnostic with a code attributed to the current stage
    pub fn diagnose_code(&mut self, level: DiagnosticLevel, code: &str, message: impl Into<String>) {
        let entry = DiagnosticEntry::new(level, self.current_stage().to_string(), message).with_code(code);
        self.diagnostics.push(entry);
    }

    pub fn push_diagnostic(&mut self, entry: DiagnosticEntry) {
        self.diagnostics.push(entry);
    }

    pub fn diagnostics(&self) -> &DiagnosticsLog {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> DiagnosticsLog {
        std::mem::take(&mut self.diagnostics)
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Register a handler to run once when the request ends
    pub fn register_cleanup<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.cleanup.push(CleanupEntry {
            name: name.into(),
            handler: Box::new(handler),
        });
    }

    pub fn pending_cleanup(&self) -> usize {
        self.cleanup.len()
    }

    /// Run every registered handler in reverse registration order.
    ///
    /// Each handler is isolated: an error or panic is logged and recorded
    /// but never prevents the remaining handlers from running. Handlers are
    /// drained, so a second call runs nothing. Returns the failure count.
    pub fn run_cleanup(&mut self) -> usize {
        let mut failures = 0;
        while let Some(entry) = self.cleanup.pop() {
            let CleanupEntry { name, handler } = entry;
            let message = match catch_unwind(AssertUnwindSafe(handler)) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("cleanup handler '{}' failed: {:#}", name, e),
                Err(_) => format!("cleanup handler '{}' panicked", name),
            };
            failures += 1;
            tracing::warn!(request_id = %self.request_id, handler = %name, "{}", message);
            self.diagnostics.push(
                DiagnosticEntry::new(DiagnosticLevel::Warning, "cleanup", message).with_code("CLEANUP_FAILED"),
            );
        }
        failures
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("request_id", &self.request_id)
            .field("command", &self.command)
            .field("scope_id", &self.scope_id)
            .field("step", &self.step)
            .field("plan", &self.plan)
            .field("decisions", &self.decisions)
            .field("pending_cleanup", &self.cleanup.len())
            .finish()
    }
}
