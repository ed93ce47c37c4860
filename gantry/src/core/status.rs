//! Stage, pipeline, and rollout status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage has not started yet.
    Pending,
    /// Stage is currently executing.
    Running,
    /// Stage completed and its gate allowed the pipeline to proceed.
    Passed,
    /// Stage failed, timed out, or its gate halted the pipeline.
    Failed,
    /// Stage never ran because an earlier gate halted the pipeline.
    Skipped,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Skipped)
    }

    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// The overall status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// The run has not been started.
    NotStarted,
    /// The run is in progress.
    Running,
    /// Every stage passed its gate.
    Passed,
    /// A stage failed, a gate halted, or the run was cancelled.
    Failed,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running => write!(f, "running"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl PipelineStatus {
    /// Returns true if the run has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }

    /// Returns true if the run passed every gate.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// The observed state of a deployment rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutState {
    /// Replicas are still coming up.
    Progressing,
    /// All desired replicas report available.
    Available,
    /// The rollout did not complete within the deploy timeout.
    Failed,
}

impl fmt::Display for RolloutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progressing => write!(f, "progressing"),
            Self::Available => write!(f, "available"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl RolloutState {
    /// Returns true if the rollout has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Available | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_display() {
        assert_eq!(StageStatus::Passed.to_string(), "passed");
        assert_eq!(StageStatus::Failed.to_string(), "failed");
        assert_eq!(StageStatus::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_stage_status_is_terminal() {
        assert!(StageStatus::Passed.is_terminal());
        assert!(StageStatus::Failed.is_terminal());
        assert!(StageStatus::Skipped.is_terminal());
        assert!(!StageStatus::Pending.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
    }

    #[test]
    fn test_pipeline_status_default() {
        assert_eq!(PipelineStatus::default(), PipelineStatus::NotStarted);
        assert!(!PipelineStatus::default().is_terminal());
    }

    #[test]
    fn test_rollout_state_terminal() {
        assert!(RolloutState::Available.is_terminal());
        assert!(RolloutState::Failed.is_terminal());
        assert!(!RolloutState::Progressing.is_terminal());
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&StageStatus::Skipped).unwrap();
        assert_eq!(json, r#""skipped""#);

        let deserialized: StageStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, StageStatus::Skipped);

        let json = serde_json::to_string(&PipelineStatus::NotStarted).unwrap();
        assert_eq!(json, r#""not_started""#);
    }
}
