//! Pipeline construction: builder, validation, and declarative config.

use crate::errors::ValidationError;
use crate::gate::{GateAction, GatePolicy};
use crate::core::Severity;
use crate::stage::{ExecAction, StageSpec, ToolFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Builder for a validated [`super::Pipeline`].
#[derive(Debug)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<StageSpec>,
}

impl PipelineBuilder {
    /// Creates a builder for a named pipeline.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Adds a stage.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the stage name duplicates an earlier
    /// stage, or if its declared dependency does not reference an earlier
    /// stage (the controller executes strictly in declared order, so a
    /// dependency on a later stage can never be satisfied).
    pub fn stage(mut self, spec: StageSpec) -> Result<Self, ValidationError> {
        if spec.name.trim().is_empty() {
            return Err(ValidationError::new("Stage name cannot be empty"));
        }
        if self.stages.iter().any(|s| s.name == spec.name) {
            return Err(ValidationError::new(format!(
                "Duplicate stage name '{}'",
                spec.name
            ))
            .with_stages(vec![spec.name]));
        }
        if let Some(dep) = &spec.depends_on {
            if dep == &spec.name {
                return Err(ValidationError::new(format!(
                    "Stage '{}' cannot depend on itself",
                    spec.name
                ))
                .with_stages(vec![spec.name]));
            }
            if !self.stages.iter().any(|s| &s.name == dep) {
                return Err(ValidationError::new(format!(
                    "Stage '{}' depends on '{dep}', which is not an earlier stage",
                    spec.name
                ))
                .with_stages(vec![spec.name.clone(), dep.clone()]));
            }
        }
        self.stages.push(spec);
        Ok(self)
    }

    /// Validates and returns the stage sequence.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the pipeline name is empty or no
    /// stages were added.
    pub fn build_stages(self) -> Result<(String, Vec<StageSpec>), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new(
                "Pipeline name cannot be empty or whitespace-only",
            ));
        }
        if self.stages.is_empty() {
            return Err(ValidationError::new(
                "Pipeline must contain at least one stage",
            ));
        }

        let names: HashSet<&str> = self.stages.iter().map(|s| s.name.as_str()).collect();
        debug_assert_eq!(names.len(), self.stages.len());

        Ok((self.name, self.stages))
    }
}

/// Declarative gate config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Findings at or above this severity breach the gate.
    #[serde(default = "default_gate_severity")]
    pub max_severity: Severity,
    /// Action on breach.
    #[serde(default)]
    pub on_breach: GateAction,
}

fn default_gate_severity() -> Severity {
    Severity::Info
}

impl From<GateConfig> for GatePolicy {
    fn from(config: GateConfig) -> Self {
        Self::new(config.max_severity, config.on_breach)
    }
}

/// Declarative stage config, the unit of a [`PipelineConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Unique stage name.
    pub name: String,
    /// Program to execute.
    pub command: String,
    /// Program arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Findings file the tool writes, relative to the working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings_file: Option<String>,
    /// Tool report format.
    #[serde(default)]
    pub format: ToolFormat,
    /// Gate policy. Defaults to halt-on-any-finding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateConfig>,
    /// Stage timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Explicit dependency on an earlier stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
}

impl From<StageConfig> for StageSpec {
    fn from(config: StageConfig) -> Self {
        let mut action = ExecAction::new(config.command).with_args(config.args);
        if let Some(path) = config.findings_file {
            action = action.with_findings_file(path);
        }

        let mut spec = StageSpec::new(config.name, Arc::new(action))
            .with_format(config.format)
            .with_gate(config.gate.map(Into::into).unwrap_or_default());
        if let Some(secs) = config.timeout_secs {
            spec = spec.with_timeout(Duration::from_secs(secs));
        }
        if let Some(dep) = config.depends_on {
            spec = spec.depends_on(dep);
        }
        spec
    }
}

/// Declarative pipeline config, deserializable from JSON.
///
/// This is the CI-file shape: stage order in the document is execution
/// order, and an omitted gate means halt on any finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// The pipeline name.
    pub name: String,
    /// Stages in execution order.
    pub stages: Vec<StageConfig>,
}

impl PipelineConfig {
    /// Parses a config from JSON text.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Converts the config into a validated builder.
    pub fn into_builder(self) -> Result<PipelineBuilder, ValidationError> {
        let mut builder = PipelineBuilder::new(self.name);
        for stage in self.stages {
            builder = builder.stage(stage.into())?;
        }
        Ok(builder)
    }
}
