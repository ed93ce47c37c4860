//! Timeout-bounded stage execution.

use super::StageSpec;
use crate::context::RunContext;
use crate::core::StageResult;
use crate::events::EventSink;
use crate::pipeline::RunLog;
use chrono::Utc;
use std::sync::Arc;

/// Executes single stages, recording each result in the run log exactly once.
pub struct StageRunner {
    log: Arc<dyn RunLog>,
    sink: Arc<dyn EventSink>,
}

impl StageRunner {
    /// Creates a runner writing to the given run log and event sink.
    #[must_use]
    pub fn new(log: Arc<dyn RunLog>, sink: Arc<dyn EventSink>) -> Self {
        Self { log, sink }
    }

    /// Runs one stage to completion.
    ///
    /// The action is bounded by the spec's timeout; on timeout the result
    /// is `failed` with a synthetic `timeout` finding. An action that could
    /// not start at all (IO error) also yields a `failed` result rather
    /// than an error, so a broken tool never crashes the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an IO error only if the run log itself cannot be written;
    /// the log must be durable before the controller can continue.
    pub async fn run(&self, spec: &StageSpec, ctx: &RunContext) -> std::io::Result<StageResult> {
        let started_at = Utc::now();
        self.sink.try_emit(
            "stage.started",
            Some(serde_json::json!({
                "stage": &spec.name,
                "build_id": &ctx.build_id,
            })),
        );

        let result = match tokio::time::timeout(spec.timeout, spec.action.run(ctx)).await {
            Err(_elapsed) => StageResult::timed_out(&spec.name, spec.timeout.as_secs()),
            Ok(Err(io_err)) => StageResult::failed(
                &spec.name,
                None,
                Vec::new(),
                format!("Action could not start: {io_err}"),
            ),
            Ok(Ok(outcome)) => {
                let findings = outcome
                    .report
                    .as_deref()
                    .map(|raw| spec.format.parse(raw))
                    .unwrap_or_default();

                if outcome.exit_code == 0 {
                    StageResult::passed(&spec.name, 0, findings)
                } else {
                    StageResult::failed(
                        &spec.name,
                        Some(outcome.exit_code),
                        findings,
                        format!("Tool exited with code {}", outcome.exit_code),
                    )
                }
            }
        };
        let result = result.with_started_at(started_at);

        self.log.append(&ctx.build_id, &result)?;

        let event = if result.is_success() {
            "stage.passed"
        } else {
            "stage.failed"
        };
        self.sink.try_emit(
            event,
            Some(serde_json::json!({
                "stage": &spec.name,
                "exit_code": result.exit_code,
                "findings": result.findings.len(),
            })),
        );

        Ok(result)
    }

    /// Records a skipped stage in the run log.
    pub fn record_skipped(
        &self,
        stage: &str,
        reason: &str,
        ctx: &RunContext,
    ) -> std::io::Result<StageResult> {
        let result = StageResult::skipped(stage, reason);
        self.log.append(&ctx.build_id, &result)?;
        self.sink.try_emit(
            "stage.skipped",
            Some(serde_json::json!({
                "stage": stage,
                "reason": reason,
            })),
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SourceEvent;
    use crate::core::{Severity, StageStatus};
    use crate::events::CollectingEventSink;
    use crate::pipeline::MemoryRunLog;
    use crate::stage::{ActionOutcome, FnAction, ToolFormat};
    use crate::testing::ScriptedAction;
    use std::time::Duration;

    fn setup() -> (Arc<MemoryRunLog>, Arc<CollectingEventSink>, RunContext) {
        let log = Arc::new(MemoryRunLog::new());
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = RunContext::from_event(&SourceEvent::new("abc123", "main"), "/tmp").unwrap();
        (log, sink, ctx)
    }

    #[tokio::test]
    async fn test_run_passing_stage() {
        let (log, sink, ctx) = setup();
        let runner = StageRunner::new(log.clone(), sink.clone());

        let spec = StageSpec::new(
            "build",
            Arc::new(FnAction::new("build", |_| Ok(ActionOutcome::exit(0)))),
        );
        let result = runner.run(&spec, &ctx).await.unwrap();

        assert_eq!(result.status, StageStatus::Passed);
        assert!(result.started_at.is_some());
        assert_eq!(log.records_for("abc123").len(), 1);
        assert_eq!(sink.events_of_type("stage.passed").len(), 1);
    }

    #[tokio::test]
    async fn test_run_failing_exit_code() {
        let (log, sink, ctx) = setup();
        let runner = StageRunner::new(log, sink);

        let spec = StageSpec::new(
            "sast",
            Arc::new(FnAction::new("sast", |_| Ok(ActionOutcome::exit(2)))),
        );
        let result = runner.run(&spec, &ctx).await.unwrap();

        assert_eq!(result.status, StageStatus::Failed);
        assert_eq!(result.exit_code, Some(2));
    }

    #[tokio::test]
    async fn test_findings_parsed_from_report() {
        let (log, sink, ctx) = setup();
        let runner = StageRunner::new(log, sink);

        let report = r#"[{"severity": "high", "rule_id": "R1"}]"#;
        let spec = StageSpec::new(
            "scan",
            Arc::new(FnAction::new("scan", move |_| {
                Ok(ActionOutcome::with_report(0, report))
            })),
        )
        .with_format(ToolFormat::Generic);

        let result = runner.run(&spec, &ctx).await.unwrap();
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn test_malformed_report_falls_back_to_exit_code() {
        let (log, sink, ctx) = setup();
        let runner = StageRunner::new(log, sink);

        let spec = StageSpec::new(
            "scan",
            Arc::new(FnAction::new("scan", |_| {
                Ok(ActionOutcome::with_report(0, "<<<garbage>>>"))
            })),
        );
        let result = runner.run(&spec, &ctx).await.unwrap();

        assert_eq!(result.status, StageStatus::Passed);
        assert!(result.findings.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_produces_timeout_finding() {
        let (log, sink, ctx) = setup();
        let runner = StageRunner::new(log.clone(), sink);

        let spec = StageSpec::new("slow", Arc::new(ScriptedAction::hanging()))
            .with_timeout(Duration::from_millis(20));

        let result = runner.run(&spec, &ctx).await.unwrap();
        assert_eq!(result.status, StageStatus::Failed);
        assert_eq!(result.findings[0].rule_id, "timeout");
        // Still logged exactly once.
        assert_eq!(log.records_for("abc123").len(), 1);
    }

    #[tokio::test]
    async fn test_io_error_becomes_failed_result() {
        let (log, sink, ctx) = setup();
        let runner = StageRunner::new(log, sink);

        let spec = StageSpec::new(
            "broken",
            Arc::new(FnAction::new("broken", |_| {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no tool"))
            })),
        );
        let result = runner.run(&spec, &ctx).await.unwrap();

        assert_eq!(result.status, StageStatus::Failed);
        assert!(result.error.unwrap().contains("no tool"));
    }

    #[tokio::test]
    async fn test_record_skipped() {
        let (log, sink, ctx) = setup();
        let runner = StageRunner::new(log.clone(), sink.clone());

        let result = runner
            .record_skipped("push", "halted by gate at 'sast'", &ctx)
            .unwrap();

        assert_eq!(result.status, StageStatus::Skipped);
        assert_eq!(log.records_for("abc123").len(), 1);
        assert_eq!(sink.events_of_type("stage.skipped").len(), 1);
    }
}
