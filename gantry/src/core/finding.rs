//! Normalized scanner findings.
//!
//! Every tool adapter converges on this flat schema so that gate policies
//! can be evaluated without knowing which scanner produced the report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Severity of a finding, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational only.
    Info,
    /// Low severity.
    Low,
    /// Medium severity.
    Medium,
    /// High severity.
    High,
    /// Critical severity.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Error returned when a severity string is not recognized.
#[derive(Debug, Clone, Error)]
#[error("Unknown severity: '{0}'")]
pub struct UnknownSeverity(pub String);

impl FromStr for Severity {
    type Err = UnknownSeverity;

    /// Parses a severity, tolerating the spellings scanners actually emit
    /// (`CRITICAL`, `Critical`, `moderate`, `warning`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" | "informational" | "note" | "unknown" => Ok(Self::Info),
            "low" | "minor" => Ok(Self::Low),
            "medium" | "moderate" | "warning" => Ok(Self::Medium),
            "high" | "major" | "error" => Ok(Self::High),
            "critical" | "blocker" => Ok(Self::Critical),
            other => Err(UnknownSeverity(other.to_string())),
        }
    }
}

/// A single normalized finding reported by a stage's tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Severity of the finding.
    pub severity: Severity,
    /// The tool's rule or check identifier.
    pub rule_id: String,
    /// Where the finding was located (file path, image layer, package, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Finding {
    /// Creates a new finding.
    #[must_use]
    pub fn new(severity: Severity, rule_id: impl Into<String>) -> Self {
        Self {
            severity,
            rule_id: rule_id.into(),
            location: None,
        }
    }

    /// Sets the location.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// The synthetic finding attached to a stage that exceeded its timeout.
    #[must_use]
    pub fn timeout() -> Self {
        Self::new(Severity::Critical, "timeout")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_parse_tolerant() {
        assert_eq!("CRITICAL".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!("Critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!("moderate".parse::<Severity>().unwrap(), Severity::Medium);
        assert_eq!(" high ".parse::<Severity>().unwrap(), Severity::High);
        assert!("bogus".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_serialize() {
        let json = serde_json::to_string(&Severity::High).unwrap();
        assert_eq!(json, r#""high""#);
    }

    #[test]
    fn test_finding_builder() {
        let finding = Finding::new(Severity::High, "G402").with_location("main.go:41");
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.rule_id, "G402");
        assert_eq!(finding.location.as_deref(), Some("main.go:41"));
    }

    #[test]
    fn test_timeout_finding_is_critical() {
        let finding = Finding::timeout();
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.rule_id, "timeout");
    }
}
