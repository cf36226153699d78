//! Per-request diagnostics log
//!
//! Entries are append-only and attributed to the stage that emitted them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub level: DiagnosticLevel,
    /// Stage that emitted the entry
    pub stage: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    pub recorded_at: DateTime<Utc>,
}

impl DiagnosticEntry {
    pub fn new(level: DiagnosticLevel, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            stage: stage.into(),
            message: message.into(),
            code: None,
            context: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// Append-only collection of diagnostics for one request
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsLog {
    entries: Vec<DiagnosticEntry>,
}

impl DiagnosticsLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: DiagnosticEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[DiagnosticEntry] {
        &self.entries
    }

    pub fn for_stage<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a DiagnosticEntry> + 'a {
        self.entries.iter().filter(move |e| e.stage == stage)
    }

    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a DiagnosticEntry> + 'a {
        self.entries.iter().filter(move |e| e.code.as_deref() == Some(code))
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.level == DiagnosticLevel::Error)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<DiagnosticEntry> {
        self.entries
    }
}
