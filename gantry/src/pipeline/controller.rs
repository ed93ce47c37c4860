//! The pipeline controller: a sequential, fail-fast state machine.

use super::spec::PipelineBuilder;
use super::{MemoryRunLog, RunLog};
use crate::cancellation::CancellationToken;
use crate::context::RunContext;
use crate::core::{Finding, PipelineStatus, StageResult};
use crate::errors::{GantryError, ValidationError};
use crate::events::{EventSink, NoOpEventSink};
use crate::gate::GateDecision;
use crate::stage::{StageRunner, StageSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A gate breach the pipeline proceeded past under a warn policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateWarning {
    /// The stage whose gate warned.
    pub stage: String,
    /// The findings that breached the threshold.
    pub breaches: Vec<Finding>,
}

/// The immutable record of one completed pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// The pipeline name.
    pub pipeline: String,
    /// The build identifier keying this run.
    pub build_id: String,
    /// Terminal status: exactly one of `passed` or `failed`.
    pub status: PipelineStatus,
    /// Per-stage results in declared order, one per stage.
    pub results: Vec<StageResult>,
    /// Gate breaches recorded under warn policies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<GateWarning>,
    /// The cancellation reason, if the run was cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    /// When the run reached its terminal status.
    pub finished_at: DateTime<Utc>,
}

impl PipelineRun {
    /// Returns the result for a named stage, if present.
    #[must_use]
    pub fn result_for(&self, stage: &str) -> Option<&StageResult> {
        self.results.iter().find(|r| r.stage == stage)
    }
}

/// A validated, executable pipeline.
///
/// One `execute` call produces one `PipelineRun`. Stages run strictly in
/// declared order; independent runs of the same pipeline may execute
/// concurrently, sharing only the (internally synchronized) run log.
pub struct Pipeline {
    name: String,
    stages: Vec<StageSpec>,
    log: Arc<dyn RunLog>,
    sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stages.iter().map(|s| &s.name).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Replaces the run log.
    #[must_use]
    pub fn with_run_log(mut self, log: Arc<dyn RunLog>) -> Self {
        self.log = log;
        self
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Attaches a cancellation token checked between stages.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Executes the pipeline against a run context.
    ///
    /// For each stage in declared order: run it, evaluate its gate. On a
    /// halt the remaining stages are recorded as skipped and the run fails;
    /// on a warn the breach is recorded and execution proceeds. The run log
    /// holds every result, durably, before this method returns.
    ///
    /// # Errors
    ///
    /// Returns `GantryError::Io` only if the run log cannot be written.
    /// Tool failures and gate halts are reported through the returned
    /// `PipelineRun`, not as errors.
    pub async fn execute(&self, ctx: &RunContext) -> Result<PipelineRun, GantryError> {
        let runner = StageRunner::new(self.log.clone(), self.sink.clone());
        let mut results: Vec<StageResult> = Vec::with_capacity(self.stages.len());
        let mut warnings: Vec<GateWarning> = Vec::new();
        let mut halted_at: Option<String> = None;
        let mut cancel_reason: Option<String> = None;

        for (index, spec) in self.stages.iter().enumerate() {
            // Cooperative cancellation: checked between stages only. Once a
            // halt has occurred the run is already terminal, so a later
            // cancel signal changes nothing.
            if halted_at.is_none() && self.cancel.is_cancelled() {
                cancel_reason = self.cancel.reason();
                let reason = cancel_reason
                    .clone()
                    .unwrap_or_else(|| "cancelled".to_string());
                self.sink.try_emit(
                    "pipeline.cancelled",
                    Some(serde_json::json!({
                        "pipeline": &self.name,
                        "build_id": &ctx.build_id,
                        "reason": &reason,
                    })),
                );
                for remaining in &self.stages[index..] {
                    results.push(runner.record_skipped(
                        &remaining.name,
                        &format!("run cancelled: {reason}"),
                        ctx,
                    )?);
                }
                break;
            }

            if let Some(halted_stage) = &halted_at {
                results.push(runner.record_skipped(
                    &spec.name,
                    &format!("halted by gate at '{halted_stage}'"),
                    ctx,
                )?);
                continue;
            }

            let result = runner.run(spec, ctx).await?;
            let decision = spec.gate.evaluate(&result);
            results.push(result);

            match decision {
                GateDecision::Proceed => {}
                GateDecision::Warn { breaches } => {
                    self.sink.try_emit(
                        "gate.warned",
                        Some(serde_json::json!({
                            "stage": &spec.name,
                            "breaches": breaches.len(),
                        })),
                    );
                    warnings.push(GateWarning {
                        stage: spec.name.clone(),
                        breaches,
                    });
                }
                GateDecision::Halt { breaches } => {
                    self.sink.try_emit(
                        "gate.halted",
                        Some(serde_json::json!({
                            "stage": &spec.name,
                            "breaches": breaches.len(),
                        })),
                    );
                    halted_at = Some(spec.name.clone());
                }
            }
        }

        let status = if halted_at.is_some() || cancel_reason.is_some() {
            PipelineStatus::Failed
        } else {
            PipelineStatus::Passed
        };

        let run = PipelineRun {
            pipeline: self.name.clone(),
            build_id: ctx.build_id.clone(),
            status,
            results,
            warnings,
            cancel_reason,
            finished_at: Utc::now(),
        };

        let event = if status.is_success() {
            "pipeline.passed"
        } else {
            "pipeline.failed"
        };
        self.sink.try_emit(
            event,
            Some(serde_json::json!({
                "pipeline": &self.name,
                "build_id": &run.build_id,
                "warnings": run.warnings.len(),
            })),
        );

        Ok(run)
    }
}

impl PipelineBuilder {
    /// Validates the builder and produces an executable pipeline with a
    /// default in-memory run log and no-op event sink.
    pub fn build(self) -> Result<Pipeline, ValidationError> {
        let (name, stages) = self.build_stages()?;
        Ok(Pipeline {
            name,
            stages,
            log: Arc::new(MemoryRunLog::new()),
            sink: Arc::new(NoOpEventSink),
            cancel: Arc::new(CancellationToken::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SourceEvent;
    use crate::core::StageStatus;
    use crate::gate::GatePolicy;
    use crate::stage::{ActionOutcome, FnAction, StageAction};

    fn passing(name: &str) -> StageSpec {
        let action: Arc<dyn StageAction> =
            Arc::new(FnAction::new(name.to_string(), |_| Ok(ActionOutcome::exit(0))));
        StageSpec::new(name, action)
    }

    fn ctx() -> RunContext {
        RunContext::from_event(&SourceEvent::new("abc123", "main"), "/tmp").unwrap()
    }

    #[tokio::test]
    async fn test_all_stages_pass() {
        let pipeline = PipelineBuilder::new("demo")
            .stage(passing("a"))
            .unwrap()
            .stage(passing("b"))
            .unwrap()
            .build()
            .unwrap();

        let run = pipeline.execute(&ctx()).await.unwrap();
        assert_eq!(run.status, PipelineStatus::Passed);
        assert_eq!(run.results.len(), 2);
        assert!(run.results.iter().all(StageResult::is_success));
    }

    #[tokio::test]
    async fn test_halt_skips_remaining_stages() {
        let failing: Arc<dyn StageAction> =
            Arc::new(FnAction::new("fail", |_| Ok(ActionOutcome::exit(1))));

        let pipeline = PipelineBuilder::new("demo")
            .stage(passing("a"))
            .unwrap()
            .stage(StageSpec::new("b", failing))
            .unwrap()
            .stage(passing("c"))
            .unwrap()
            .stage(passing("d"))
            .unwrap()
            .build()
            .unwrap();

        let run = pipeline.execute(&ctx()).await.unwrap();
        assert_eq!(run.status, PipelineStatus::Failed);
        assert_eq!(run.result_for("a").unwrap().status, StageStatus::Passed);
        assert_eq!(run.result_for("b").unwrap().status, StageStatus::Failed);
        assert_eq!(run.result_for("c").unwrap().status, StageStatus::Skipped);
        assert_eq!(run.result_for("d").unwrap().status, StageStatus::Skipped);
    }

    #[tokio::test]
    async fn test_warn_gate_records_and_proceeds() {
        let report = r#"[{"severity": "high", "rule_id": "R1"}]"#;
        let warning_stage: Arc<dyn StageAction> = Arc::new(FnAction::new("scan", move |_| {
            Ok(ActionOutcome::with_report(0, report))
        }));

        let pipeline = PipelineBuilder::new("demo")
            .stage(
                StageSpec::new("scan", warning_stage)
                    .with_gate(GatePolicy::warn_at(crate::core::Severity::Medium)),
            )
            .unwrap()
            .stage(passing("build"))
            .unwrap()
            .build()
            .unwrap();

        let run = pipeline.execute(&ctx()).await.unwrap();
        assert_eq!(run.status, PipelineStatus::Passed);
        assert_eq!(run.warnings.len(), 1);
        assert_eq!(run.warnings[0].stage, "scan");
        assert_eq!(run.result_for("build").unwrap().status, StageStatus::Passed);
    }

    #[tokio::test]
    async fn test_cancellation_between_stages() {
        let token = Arc::new(CancellationToken::new());
        let cancel_handle = token.clone();

        let canceller: Arc<dyn StageAction> = Arc::new(FnAction::new("a", move |_| {
            cancel_handle.cancel("operator abort");
            Ok(ActionOutcome::exit(0))
        }));

        let pipeline = PipelineBuilder::new("demo")
            .stage(StageSpec::new("a", canceller))
            .unwrap()
            .stage(passing("b"))
            .unwrap()
            .build()
            .unwrap()
            .with_cancellation(token);

        let run = pipeline.execute(&ctx()).await.unwrap();
        assert_eq!(run.status, PipelineStatus::Failed);
        assert_eq!(run.cancel_reason.as_deref(), Some("operator abort"));
        // Stage a completed before the signal was observed; b never ran.
        assert_eq!(run.result_for("a").unwrap().status, StageStatus::Passed);
        assert_eq!(run.result_for("b").unwrap().status, StageStatus::Skipped);
    }

    #[tokio::test]
    async fn test_run_log_receives_every_result() {
        let log = Arc::new(MemoryRunLog::new());
        let pipeline = PipelineBuilder::new("demo")
            .stage(passing("a"))
            .unwrap()
            .stage(passing("b"))
            .unwrap()
            .build()
            .unwrap()
            .with_run_log(log.clone());

        pipeline.execute(&ctx()).await.unwrap();
        assert_eq!(log.records_for("abc123").len(), 2);
    }
}
