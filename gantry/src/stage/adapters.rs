//! Per-tool findings adapters.
//!
//! Each scanner family emits its own report schema. The adapters normalize
//! all of them into the flat `Finding` list the gate evaluator understands.
//! Parsing is strictly best-effort: a malformed or unrecognized report
//! yields no findings, and the stage's status falls back to its exit code.

use crate::core::{Finding, Severity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The report format of the tool backing a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFormat {
    /// A flat list of `{severity, rule_id, location}` records, optionally
    /// wrapped in `{"findings": [...]}`.
    #[default]
    Generic,
    /// Secret scanner output (gitleaks-style): a list of leak records.
    /// Every leak is treated as critical.
    SecretScan,
    /// Static analysis output (bandit-style): `{"results": [...]}` with
    /// `issue_severity`, `test_id`, `filename`, `line_number`.
    Sast,
    /// Dependency audit output: `{"vulnerabilities": [...]}` with
    /// `severity`, `id`, `package_name`.
    Sca,
    /// Container image scan output (trivy-style): `{"Results": [...]}`,
    /// each with a `Vulnerabilities` list.
    ContainerScan,
}

impl ToolFormat {
    /// Parses a raw tool report into normalized findings.
    ///
    /// Returns an empty list on malformed input; never errors.
    #[must_use]
    pub fn parse(&self, raw: &str) -> Vec<Finding> {
        let Ok(value) = serde_json::from_str::<Value>(raw) else {
            return Vec::new();
        };

        match self {
            Self::Generic => parse_generic(&value),
            Self::SecretScan => parse_secret_scan(&value),
            Self::Sast => parse_sast(&value),
            Self::Sca => parse_sca(&value),
            Self::ContainerScan => parse_container_scan(&value),
        }
    }
}

fn severity_of(value: Option<&Value>, fallback: Severity) -> Severity {
    value
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(fallback)
}

fn str_of(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(ToString::to_string)
}

fn parse_generic(value: &Value) -> Vec<Finding> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => match obj.get("findings").and_then(Value::as_array) {
            Some(items) => items.as_slice(),
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| {
            let rule_id = str_of(item.get("rule_id"))?;
            let mut finding =
                Finding::new(severity_of(item.get("severity"), Severity::Info), rule_id);
            if let Some(location) = str_of(item.get("location")) {
                finding = finding.with_location(location);
            }
            Some(finding)
        })
        .collect()
}

fn parse_secret_scan(value: &Value) -> Vec<Finding> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let rule_id = str_of(item.get("RuleID")).or_else(|| str_of(item.get("Description")))?;
            // A leaked credential is critical no matter what the tool says.
            let mut finding = Finding::new(Severity::Critical, rule_id);
            if let Some(file) = str_of(item.get("File")) {
                let location = match item.get("StartLine").and_then(Value::as_i64) {
                    Some(line) => format!("{file}:{line}"),
                    None => file,
                };
                finding = finding.with_location(location);
            }
            Some(finding)
        })
        .collect()
}

fn parse_sast(value: &Value) -> Vec<Finding> {
    let Some(results) = value.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };

    results
        .iter()
        .filter_map(|item| {
            let rule_id = str_of(item.get("test_id")).or_else(|| str_of(item.get("check_id")))?;
            let mut finding = Finding::new(
                severity_of(item.get("issue_severity"), Severity::Medium),
                rule_id,
            );
            if let Some(file) = str_of(item.get("filename")) {
                let location = match item.get("line_number").and_then(Value::as_i64) {
                    Some(line) => format!("{file}:{line}"),
                    None => file,
                };
                finding = finding.with_location(location);
            }
            Some(finding)
        })
        .collect()
}

fn parse_sca(value: &Value) -> Vec<Finding> {
    let Some(vulns) = value.get("vulnerabilities").and_then(Value::as_array) else {
        return Vec::new();
    };

    vulns
        .iter()
        .filter_map(|item| {
            let rule_id = str_of(item.get("id")).or_else(|| str_of(item.get("vuln_id")))?;
            let mut finding =
                Finding::new(severity_of(item.get("severity"), Severity::Medium), rule_id);
            if let Some(package) = str_of(item.get("package_name")) {
                finding = finding.with_location(package);
            }
            Some(finding)
        })
        .collect()
}

fn parse_container_scan(value: &Value) -> Vec<Finding> {
    let Some(results) = value.get("Results").and_then(Value::as_array) else {
        return Vec::new();
    };

    results
        .iter()
        .flat_map(|target| {
            let target_name = str_of(target.get("Target"));
            target
                .get("Vulnerabilities")
                .and_then(Value::as_array)
                .map(|vulns| {
                    vulns
                        .iter()
                        .filter_map(|item| {
                            let rule_id = str_of(item.get("VulnerabilityID"))?;
                            let mut finding = Finding::new(
                                severity_of(item.get("Severity"), Severity::Medium),
                                rule_id,
                            );
                            let location = str_of(item.get("PkgName")).or_else(|| target_name.clone());
                            if let Some(location) = location {
                                finding = finding.with_location(location);
                            }
                            Some(finding)
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        })
        .collect()
}
