//! Pipeline building and execution.
//!
//! This module provides:
//! - Pipeline builder with validation
//! - Declarative pipeline config
//! - The sequential, fail-fast controller
//! - The append-only run log

mod controller;
mod runlog;
mod spec;


pub use controller::{GateWarning, Pipeline, PipelineRun};
pub use runlog::{JsonlRunLog, MemoryRunLog, RunLog, RunLogRecord};
pub use spec::{GateConfig, PipelineBuilder, PipelineConfig, StageConfig};
