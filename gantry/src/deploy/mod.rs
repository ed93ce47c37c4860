//! Deployment orchestration: manifests, the cluster seam, and rollout
//! polling.

mod cluster;
mod manifest;
mod orchestrator;

pub use cluster::{Cluster, ClusterError, ReplicaCounts};
pub use manifest::{
    service_manifest, ManifestTemplate, IMAGE_PLACEHOLDER, NAMESPACE_PLACEHOLDER,
};
pub use orchestrator::{
    DeployTarget, DeploymentOrchestrator, DeploymentRecord, RolloutSnapshot,
};
