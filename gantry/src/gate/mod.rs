//! Gate policies and evaluation.
//!
//! A gate is a pure function of a stage result and a policy: it counts
//! findings at or above the policy's severity threshold and decides whether
//! the pipeline proceeds, proceeds with a recorded warning, or halts.

use crate::core::{Finding, Severity, StageResult};
use serde::{Deserialize, Serialize};

/// What a gate does when its threshold is breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    /// Stop the pipeline; remaining stages are skipped.
    #[default]
    Halt,
    /// Record the breach in the run report and proceed.
    Warn,
}

/// Per-stage gate policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Findings at or above this severity count as breaches.
    pub max_severity: Severity,
    /// Action taken when at least one breach is found.
    pub on_breach: GateAction,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self::halt_on_any()
    }
}

impl GatePolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(max_severity: Severity, on_breach: GateAction) -> Self {
        Self {
            max_severity,
            on_breach,
        }
    }

    /// Halts on any finding at all. The strictest policy, and the default:
    /// scanners in a security-gated pipeline are expected to come back clean.
    #[must_use]
    pub fn halt_on_any() -> Self {
        Self::new(Severity::Info, GateAction::Halt)
    }

    /// Halts on findings at or above the given severity.
    #[must_use]
    pub fn halt_at(severity: Severity) -> Self {
        Self::new(severity, GateAction::Halt)
    }

    /// Warns on findings at or above the given severity, but proceeds.
    #[must_use]
    pub fn warn_at(severity: Severity) -> Self {
        Self::new(severity, GateAction::Warn)
    }

    /// Evaluates a stage result against this policy.
    ///
    /// A result with status `failed` always halts, regardless of findings:
    /// a broken or timed-out scan cannot vouch for the artifact.
    #[must_use]
    pub fn evaluate(&self, result: &StageResult) -> GateDecision {
        if result.is_failure() {
            return GateDecision::Halt {
                breaches: result.findings.clone(),
            };
        }

        let breaches: Vec<Finding> = result
            .findings_at_or_above(self.max_severity)
            .into_iter()
            .cloned()
            .collect();

        if breaches.is_empty() {
            return GateDecision::Proceed;
        }

        match self.on_breach {
            GateAction::Halt => GateDecision::Halt { breaches },
            GateAction::Warn => GateDecision::Warn { breaches },
        }
    }
}

/// The decision a gate produces for one stage result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum GateDecision {
    /// No breaches; the pipeline continues.
    Proceed,
    /// Breaches found, policy says proceed anyway; recorded in the report.
    Warn {
        /// The findings that breached the threshold.
        breaches: Vec<Finding>,
    },
    /// Breaches found (or the stage itself failed); the pipeline stops.
    Halt {
        /// The findings that breached the threshold.
        breaches: Vec<Finding>,
    },
}

impl GateDecision {
    /// Returns true if the pipeline may continue past this gate.
    #[must_use]
    pub fn allows_progress(&self) -> bool {
        !matches!(self, Self::Halt { .. })
    }

    /// Returns true if this decision is a halt.
    #[must_use]
    pub fn is_halt(&self) -> bool {
        matches!(self, Self::Halt { .. })
    }
}
