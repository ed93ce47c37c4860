//! Core data model: statuses, findings, and stage results.

mod finding;
mod result;
mod status;

pub use finding::{Finding, Severity, UnknownSeverity};
pub use result::StageResult;
pub use status::{PipelineStatus, RolloutState, StageStatus};
