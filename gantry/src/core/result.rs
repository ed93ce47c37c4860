//! Stage results with factory constructors.

use super::{Finding, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The recorded outcome of one stage execution.
///
/// A `StageResult` is created when a stage finishes and never mutated
/// afterwards; the run log stores exactly one per stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage name.
    pub stage: String,

    /// The terminal status of the stage.
    pub status: StageStatus,

    /// Exit code of the external action, if the action ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Normalized findings reported by the stage's tool.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,

    /// Error message (for failed executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the stage began executing, if it ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the stage reached its terminal status.
    pub finished_at: DateTime<Utc>,
}

impl StageResult {
    /// Creates a passed result.
    #[must_use]
    pub fn passed(stage: impl Into<String>, exit_code: i32, findings: Vec<Finding>) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Passed,
            exit_code: Some(exit_code),
            findings,
            error: None,
            started_at: None,
            finished_at: Utc::now(),
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(
        stage: impl Into<String>,
        exit_code: Option<i32>,
        findings: Vec<Finding>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Failed,
            exit_code,
            findings,
            error: Some(error.into()),
            started_at: None,
            finished_at: Utc::now(),
        }
    }

    /// Creates a failed result for a stage that exceeded its timeout.
    ///
    /// The result carries a synthetic `timeout` finding so the gate report
    /// explains why the stage produced no tool output.
    #[must_use]
    pub fn timed_out(stage: impl Into<String>, timeout_secs: u64) -> Self {
        let stage = stage.into();
        Self {
            stage: stage.clone(),
            status: StageStatus::Failed,
            exit_code: None,
            findings: vec![Finding::timeout()],
            error: Some(format!(
                "Stage '{stage}' exceeded its timeout of {timeout_secs}s"
            )),
            started_at: None,
            finished_at: Utc::now(),
        }
    }

    /// Creates a skipped result for a stage downstream of a gate halt.
    #[must_use]
    pub fn skipped(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Skipped,
            exit_code: None,
            findings: Vec::new(),
            error: Some(reason.into()),
            started_at: None,
            finished_at: Utc::now(),
        }
    }

    /// Sets the start timestamp.
    #[must_use]
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// Returns true if the stage passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Returns the findings at or above the given severity.
    #[must_use]
    pub fn findings_at_or_above(&self, severity: super::Severity) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity >= severity)
            .collect()
    }
}
