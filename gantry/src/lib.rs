//! # Gantry
//!
//! A gated build-and-deploy pipeline orchestrator.
//!
//! Gantry sequences opaque external actions (scanners, builds, pushes) into
//! a fail-fast pipeline with:
//!
//! - **Stage-based execution**: Named units of work run strictly in declared
//!   order, each bounded by its own timeout
//! - **Gate evaluation**: Per-stage severity policies that halt or warn on
//!   findings reported by the stage's tool
//! - **Artifact promotion**: Registry publication keyed by the run's build
//!   identifier, only after a clean run
//! - **Deployment orchestration**: Templated manifest apply with rollout
//!   polling and diagnostic snapshots on failure
//! - **Cancellation handling**: Cooperative cancellation between stages
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gantry::prelude::*;
//!
//! // Define a pipeline
//! let pipeline = PipelineBuilder::new("flask-app")
//!     .stage(StageSpec::new("secrets", action).with_gate(GatePolicy::halt_on_any()))?
//!     .stage(StageSpec::new("build", build_action))?
//!     .build()?;
//!
//! // Execute against a source event
//! let ctx = RunContext::from_event(&event, workdir)?;
//! let run = pipeline.execute(&ctx).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod context;
pub mod core;
pub mod deploy;
pub mod errors;
pub mod events;
pub mod gate;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod stage;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{RunContext, SourceEvent};
    pub use crate::core::{
        Finding, PipelineStatus, RolloutState, Severity, StageResult, StageStatus,
    };
    pub use crate::deploy::{
        Cluster, DeployTarget, DeploymentOrchestrator, DeploymentRecord, ManifestTemplate,
        ReplicaCounts,
    };
    pub use crate::errors::{
        DeployError, GantryError, PromotionError, ValidationError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::gate::{GateAction, GateDecision, GatePolicy};
    pub use crate::pipeline::{
        Pipeline, PipelineBuilder, PipelineConfig, PipelineRun, RunLog,
    };
    pub use crate::registry::{Artifact, ArtifactPromoter, ImageRef, Registry};
    pub use crate::retry::{BackoffStrategy, JitterStrategy, RetryConfig};
    pub use crate::stage::{
        ActionOutcome, ExecAction, FnAction, StageAction, StageSpec, ToolFormat,
    };
}
