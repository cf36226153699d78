//! Pending gate review state machine
//!
//! A review moves `pending → injected → responded → resolved`. A rejected
//! verdict re-enters `pending` while retries remain; once the retry limit is
//! reached the review resolves with a terminal failure instead of looping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Injected,
    Responded,
    Resolved,
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Injected => "injected",
            ReviewStatus::Responded => "responded",
            ReviewStatus::Resolved => "resolved",
        };
        f.write_str(s)
    }
}

/// How a resolved review ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewResolution {
    Accepted,
    AdvisoryFailure,
    TerminalFailure,
}

/// Result of rejecting a responded review
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectOutcome {
    /// Back to `pending`; carries the retry number just consumed
    RetryScheduled(u32),
    /// Resolved with a terminal failure
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("REVIEW/cannot {action} a review in state {from}")]
    Illegal { from: ReviewStatus, action: &'static str },
}

/// A recorded state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewTransition {
    pub from: ReviewStatus,
    pub to: ReviewStatus,
    pub at: DateTime<Utc>,
}

/// Suspended quality-gate check awaiting a verdict from the calling agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingGateReview {
    pub session_id: String,
    pub gate_ids: Vec<String>,
    /// Composed review prompt text
    pub prompt: String,
    pub status: ReviewStatus,
    /// Chain step under review
    #[serde(default = "default_step")]
    pub step_number: u32,
    pub retry_count: u32,
    pub max_attempts: u32,
    /// Feedback accumulated across rejected attempts
    #[serde(default)]
    pub feedback: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ReviewResolution>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub injected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<ReviewTransition>,
}

fn default_step() -> u32 {
    1
}

impl PendingGateReview {
    /// Create a review in the `pending` state
    pub fn new(
        session_id: impl Into<String>,
        gate_ids: Vec<String>,
        prompt: impl Into<String>,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            gate_ids,
            prompt: prompt.into(),
            status: ReviewStatus::Pending,
            step_number: 1,
            retry_count: 0,
            max_attempts,
            feedback: Vec::new(),
            last_response: None,
            resolution: None,
            created_at: now,
            injected_at: None,
            responded_at: None,
            resolved_at: None,
            history: Vec::new(),
        }
    }

    pub fn for_step(mut self, step_number: u32) -> Self {
        self.step_number = step_number;
        self
    }

    /// `pending → injected`: the review prompt was sent to the client
    pub fn mark_injected(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.expect(ReviewStatus::Pending, "inject")?;
        self.injected_at = Some(now);
        self.transition(ReviewStatus::Injected, now);
        Ok(())
    }

    /// `injected → responded`: a verdict-bearing message came back
    pub fn record_response(&mut self, response: impl Into<String>, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.expect(ReviewStatus::Injected, "record a response on")?;
        self.last_response = Some(response.into());
        self.responded_at = Some(now);
        self.transition(ReviewStatus::Responded, now);
        Ok(())
    }

    /// `responded → resolved`: the verdict passed
    pub fn accept(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.expect(ReviewStatus::Responded, "accept")?;
        self.resolve(ReviewResolution::Accepted, now);
        Ok(())
    }

    /// `responded → resolved`: failed, but enforcement is advisory
    pub fn resolve_advisory(&mut self, feedback: impl Into<String>, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.expect(ReviewStatus::Responded, "resolve")?;
        self.push_feedback(feedback.into());
        self.resolve(ReviewResolution::AdvisoryFailure, now);
        Ok(())
    }

    /// Reject the verdict.
    ///
    /// Re-enters `pending` while `retry_count < max_attempts`, otherwise
    /// resolves with a terminal failure.
    pub fn reject(&mut self, feedback: impl Into<String>, now: DateTime<Utc>) -> Result<RejectOutcome, TransitionError> {
        self.expect(ReviewStatus::Responded, "reject")?;
        self.push_feedback(feedback.into());

        if self.retry_count < self.max_attempts {
            self.retry_count += 1;
            self.transition(ReviewStatus::Pending, now);
            Ok(RejectOutcome::RetryScheduled(self.retry_count))
        } else {
            self.resolve(ReviewResolution::TerminalFailure, now);
            Ok(RejectOutcome::Exhausted)
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == ReviewStatus::Resolved
    }

    pub fn retries_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.retry_count)
    }

    /// Accumulated feedback as one block of text
    pub fn feedback_text(&self) -> String {
        self.feedback
            .iter()
            .enumerate()
            .map(|(i, f)| format!("Attempt {}: {}", i + 1, f))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn push_feedback(&mut self, feedback: String) {
        let feedback = feedback.trim();
        if !feedback.is_empty() {
            self.feedback.push(feedback.to_string());
        }
    }

    fn resolve(&mut self, resolution: ReviewResolution, now: DateTime<Utc>) {
        self.resolution = Some(resolution);
        self.resolved_at = Some(now);
        self.transition(ReviewStatus::Resolved, now);
    }

    fn expect(&self, status: ReviewStatus, action: &'static str) -> Result<(), TransitionError> {
        if self.status == status {
            Ok(())
        } else {
            Err(TransitionError::Illegal { from: self.status, action })
        }
    }

    fn transition(&mut self, to: ReviewStatus, at: DateTime<Utc>) {
        self.history.push(ReviewTransition { from: self.status, to, at });
        self.status = to;
    }
}
