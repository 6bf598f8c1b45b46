//! Outcome model: what a submission phase observed and how a run ended.
//!
//! Strategies return `Liveness` (preflight) and `SubmissionResult`
//! (submission). The worker folds them into exactly one `TerminalOutcome`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A reference to something produced or observed during a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Artifact {
    /// Standard output captured from a command, etc.
    Stdout(String),

    /// Standard error captured from a command, etc.
    Stderr(String),

    /// Path to a file produced (screenshot, receipt, ...).
    FilePath(String),

    /// URL reference (confirmation page, etc.).
    Url(String),

    /// Arbitrary JSON payload.
    Json(serde_json::Value),
}

/// Positive confirmation that a submission happened.
///
/// APPLIED を書くには必ずこれが必要。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Human-readable confirmation ("confirmation page shown", receipt id, ...).
    pub summary: String,

    pub captured_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
}

impl Evidence {
    pub fn new(summary: impl Into<String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            summary: summary.into(),
            captured_at,
            artifacts: Vec::new(),
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Evidence with a blank summary and no artifacts confirms nothing.
    pub fn is_substantive(&self) -> bool {
        !self.summary.trim().is_empty() || !self.artifacts.is_empty()
    }
}

/// Phases of a worker run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Preflight,
    Submission,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Preflight => f.write_str("preflight"),
            Phase::Submission => f.write_str("submission"),
        }
    }
}

/// Result of the preflight phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Liveness {
    Alive,
    Dead { reason: String },
}

/// Result of the submission phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionResult {
    Submitted { evidence: Option<Evidence> },
    Blocked { reason: String },
    Ambiguous { reason: String },
}

/// What `report_phase` records for one phase attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PhaseOutcome {
    Preflight(Liveness),
    Submission(SubmissionResult),
    TimedOut,
    Failed { error: String },
}

/// One entry of a run's phase history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub outcome: PhaseOutcome,
    pub at: DateTime<Utc>,
}

/// The single terminal decision of a worker run.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalOutcome {
    /// CLAIMED -> APPLIED.
    Applied(Evidence),

    /// CLAIMED -> SKIPPED.
    Skipped { reason: String },

    /// CLAIMED -> DEFERRED. `requeue == false` parks the posting for an operator.
    Deferred { reason: String, requeue: bool },

    /// CLAIMED -> PENDING (the run gave the posting back untouched).
    Released { reason: String },
}

impl TerminalOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TerminalOutcome::Applied(_) => "applied",
            TerminalOutcome::Skipped { .. } => "skipped",
            TerminalOutcome::Deferred { .. } => "deferred",
            TerminalOutcome::Released { .. } => "released",
        }
    }
}
