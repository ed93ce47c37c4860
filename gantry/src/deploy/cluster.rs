//! The cluster seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Desired versus available replica counts for a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaCounts {
    /// Replicas the deployment wants.
    pub desired: u32,
    /// Replicas currently reporting available.
    pub available: u32,
}

impl ReplicaCounts {
    /// Returns true if every desired replica is available.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.available >= self.desired
    }
}

/// An error reported by the cluster API.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ClusterError(pub String);

impl ClusterError {
    /// Creates a cluster error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The external Kubernetes-like cluster seam.
///
/// `ensure_namespace` and `apply` must be idempotent: the orchestrator
/// retries them and never assumes exclusive access to the API server.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Creates the namespace if absent. Calling twice is not an error and
    /// leaves exactly one namespace.
    async fn ensure_namespace(&self, name: &str) -> Result<(), ClusterError>;

    /// Applies a rendered manifest.
    async fn apply(&self, manifest: &str) -> Result<(), ClusterError>;

    /// Reports the rollout status of a deployment.
    async fn rollout_status(
        &self,
        deployment: &str,
        namespace: &str,
    ) -> Result<ReplicaCounts, ClusterError>;

    /// Pod-level failure reasons for the diagnostic snapshot, if the
    /// cluster can provide them. Defaults to none.
    async fn pod_failures(&self, _deployment: &str, _namespace: &str) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replica_counts_complete() {
        assert!(ReplicaCounts { desired: 3, available: 3 }.is_complete());
        assert!(ReplicaCounts { desired: 0, available: 0 }.is_complete());
        assert!(!ReplicaCounts { desired: 3, available: 1 }.is_complete());
    }

    #[test]
    fn test_counts_serialize() {
        let counts = ReplicaCounts { desired: 3, available: 1 };
        let json = serde_json::to_string(&counts).unwrap();
        assert_eq!(json, r#"{"desired":3,"available":1}"#);
    }
}
