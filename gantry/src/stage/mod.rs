//! Stage definitions and the external-action seam.
//!
//! A stage names one unit of work (a scan, a build, a push) and wraps an
//! opaque external action. The orchestrator never looks inside an action;
//! it only interprets the exit code and findings report the action leaves
//! behind.

mod adapters;
mod runner;

pub use adapters::ToolFormat;
pub use runner::StageRunner;

use crate::context::RunContext;
use crate::gate::GatePolicy;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

/// What an external action left behind when it finished.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    /// The action's exit code.
    pub exit_code: i32,
    /// The machine-readable report the tool emitted, if any.
    pub report: Option<String>,
}

impl ActionOutcome {
    /// Creates an outcome with no report.
    #[must_use]
    pub fn exit(exit_code: i32) -> Self {
        Self {
            exit_code,
            report: None,
        }
    }

    /// Creates an outcome with a report.
    #[must_use]
    pub fn with_report(exit_code: i32, report: impl Into<String>) -> Self {
        Self {
            exit_code,
            report: Some(report.into()),
        }
    }
}

/// Trait for the opaque external actions stages execute.
///
/// Implementations must be cancel-safe at the await points they expose;
/// the runner bounds every invocation with the stage's timeout.
#[async_trait]
pub trait StageAction: Send + Sync + Debug {
    /// Executes the action in the given run context.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the action could not be started at all
    /// (missing binary, unreadable working directory). A tool that ran and
    /// failed reports that through its exit code instead.
    async fn run(&self, ctx: &RunContext) -> std::io::Result<ActionOutcome>;
}

/// An action that spawns an external command.
///
/// The command runs in the context working directory with the context
/// environment overlaid. If a findings file is declared it is read after
/// the command exits; otherwise captured stdout serves as the report.
#[derive(Debug, Clone)]
pub struct ExecAction {
    program: String,
    args: Vec<String>,
    findings_file: Option<PathBuf>,
}

impl ExecAction {
    /// Creates a new command-backed action.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            findings_file: None,
        }
    }

    /// Adds arguments.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Declares the findings file the tool writes, relative to the
    /// working directory.
    #[must_use]
    pub fn with_findings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.findings_file = Some(path.into());
        self
    }
}

#[async_trait]
impl StageAction for ExecAction {
    async fn run(&self, ctx: &RunContext) -> std::io::Result<ActionOutcome> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .current_dir(&ctx.working_dir)
            .envs(&ctx.env)
            .env("BUILD_ID", &ctx.build_id)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        let exit_code = output.status.code().unwrap_or(-1);

        let report = match &self.findings_file {
            Some(path) => {
                let full = ctx.working_dir.join(path);
                // A tool that found nothing may not write the file at all.
                tokio::fs::read_to_string(full).await.ok()
            }
            None => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                if stdout.trim().is_empty() {
                    None
                } else {
                    Some(stdout)
                }
            }
        };

        Ok(ActionOutcome { exit_code, report })
    }
}

/// A closure-backed action for wiring and tests.
pub struct FnAction<F>
where
    F: Fn(&RunContext) -> std::io::Result<ActionOutcome> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnAction<F>
where
    F: Fn(&RunContext) -> std::io::Result<ActionOutcome> + Send + Sync,
{
    /// Creates a new function-backed action.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnAction<F>
where
    F: Fn(&RunContext) -> std::io::Result<ActionOutcome> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAction").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> StageAction for FnAction<F>
where
    F: Fn(&RunContext) -> std::io::Result<ActionOutcome> + Send + Sync,
{
    async fn run(&self, ctx: &RunContext) -> std::io::Result<ActionOutcome> {
        (self.func)(ctx)
    }
}

/// Specification for one stage of a pipeline.
///
/// Immutable once the pipeline starts executing.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// Unique name within the pipeline.
    pub name: String,
    /// The external action this stage runs.
    pub action: Arc<dyn StageAction>,
    /// How the action's report is parsed into findings.
    pub format: ToolFormat,
    /// The gate evaluated against this stage's result.
    pub gate: GatePolicy,
    /// Upper bound on the action's runtime.
    pub timeout: Duration,
    /// Declared dependency. Defaults to the prior stage in declaration
    /// order when `None`.
    pub depends_on: Option<String>,
}

impl StageSpec {
    /// Default per-stage timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

    /// Creates a stage spec with the default gate, format, and timeout.
    #[must_use]
    pub fn new(name: impl Into<String>, action: Arc<dyn StageAction>) -> Self {
        Self {
            name: name.into(),
            action,
            format: ToolFormat::Generic,
            gate: GatePolicy::default(),
            timeout: Self::DEFAULT_TIMEOUT,
            depends_on: None,
        }
    }

    /// Sets the tool format.
    #[must_use]
    pub fn with_format(mut self, format: ToolFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the gate policy.
    #[must_use]
    pub fn with_gate(mut self, gate: GatePolicy) -> Self {
        self.gate = gate;
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Declares an explicit dependency on an earlier stage.
    #[must_use]
    pub fn depends_on(mut self, stage: impl Into<String>) -> Self {
        self.depends_on = Some(stage.into());
        self
    }
}
