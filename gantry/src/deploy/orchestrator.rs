//! Deployment orchestration: ensure, render, apply, poll.

use super::cluster::{Cluster, ReplicaCounts};
use super::manifest::ManifestTemplate;
use crate::core::RolloutState;
use crate::errors::DeployError;
use crate::events::{EventSink, NoOpEventSink};
use crate::registry::Artifact;
use crate::retry::{with_retry, RetryConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where and how an artifact is deployed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployTarget {
    /// Target namespace; created if absent.
    pub namespace: String,
    /// Deployment object name.
    pub deployment_name: String,
    /// Desired replica count.
    pub replicas: u32,
    /// The container port the workload serves on.
    pub container_port: u16,
}

impl DeployTarget {
    /// Creates a target with a single replica.
    #[must_use]
    pub fn new(namespace: impl Into<String>, deployment_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            deployment_name: deployment_name.into(),
            replicas: 1,
            container_port: 5000,
        }
    }

    /// Sets the desired replica count.
    #[must_use]
    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }

    /// Sets the container port.
    #[must_use]
    pub fn with_container_port(mut self, port: u16) -> Self {
        self.container_port = port;
        self
    }
}

/// Diagnostic snapshot taken when a rollout fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutSnapshot {
    /// Replica counts at the last poll.
    pub counts: ReplicaCounts,
    /// Pod-level failure reasons, if the cluster provided them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pod_failures: Vec<String>,
}

/// The record of one deployment attempt.
///
/// Created at deploy invocation, updated by polling, terminal on
/// `available` or timeout-triggered `failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// The target namespace.
    pub namespace: String,
    /// The deployed artifact reference.
    pub artifact_ref: String,
    /// Desired replica count.
    pub desired: u32,
    /// Observed rollout state.
    pub state: RolloutState,
    /// Diagnostic snapshot; present once polling has observed the rollout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<RolloutSnapshot>,
    /// When the rollout was last checked.
    pub last_checked: DateTime<Utc>,
}

/// Orchestrates deployment of a promoted artifact to a cluster.
pub struct DeploymentOrchestrator {
    cluster: Arc<dyn Cluster>,
    template: ManifestTemplate,
    retry: RetryConfig,
    poll_interval: Duration,
    timeout: Duration,
    sink: Arc<dyn EventSink>,
}

impl DeploymentOrchestrator {
    /// Default rollout poll interval.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
    /// Default deploy-wide timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    /// Creates an orchestrator against a cluster with a manifest template.
    #[must_use]
    pub fn new(cluster: Arc<dyn Cluster>, template: ManifestTemplate) -> Self {
        Self {
            cluster,
            template,
            retry: RetryConfig::default(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            timeout: Self::DEFAULT_TIMEOUT,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the retry configuration for namespace ensure and apply.
    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the rollout poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the deploy-wide timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Deploys a promoted artifact to the target.
    ///
    /// Ensures the namespace, renders the template with the artifact
    /// reference, applies it, then polls the rollout until all desired
    /// replicas are available or the deploy timeout elapses. A timed-out
    /// rollout returns a `failed` record with a diagnostic snapshot rather
    /// than an error, and the applied manifest is left in place for the
    /// operator.
    ///
    /// # Errors
    ///
    /// Returns `DeployError` if the artifact is unpublished, the template
    /// lacks its image placeholder, or namespace ensure / manifest apply
    /// still fail after retries.
    pub async fn deploy(
        &self,
        artifact: &Artifact,
        target: &DeployTarget,
    ) -> Result<DeploymentRecord, DeployError> {
        if !artifact.is_published() {
            return Err(DeployError::UnpublishedArtifact {
                reference: artifact.reference.clone(),
            });
        }

        with_retry(&self.retry, "cluster.ensure_namespace", || {
            self.cluster.ensure_namespace(&target.namespace)
        })
        .await
        .map_err(|e| DeployError::NamespaceEnsure {
            namespace: target.namespace.clone(),
            reason: e.last_error.to_string(),
        })?;

        let manifest = self
            .template
            .render(&artifact.reference, &target.namespace)?;

        with_retry(&self.retry, "cluster.apply", || self.cluster.apply(&manifest))
            .await
            .map_err(|e| DeployError::Apply {
                namespace: target.namespace.clone(),
                reason: e.last_error.to_string(),
            })?;

        self.sink.try_emit(
            "deploy.applied",
            Some(serde_json::json!({
                "namespace": &target.namespace,
                "artifact": &artifact.reference,
            })),
        );

        Ok(self.poll_rollout(artifact, target).await)
    }

    /// Polls the rollout until completion or timeout.
    ///
    /// Terminates within `timeout + poll_interval`: the deadline is
    /// checked after every poll, before sleeping.
    async fn poll_rollout(&self, artifact: &Artifact, target: &DeployTarget) -> DeploymentRecord {
        let deadline = Instant::now() + self.timeout;
        let mut last_counts = ReplicaCounts {
            desired: target.replicas,
            available: 0,
        };

        loop {
            match self
                .cluster
                .rollout_status(&target.deployment_name, &target.namespace)
                .await
            {
                Ok(counts) => {
                    last_counts = counts;
                    if counts.is_complete() {
                        self.sink.try_emit(
                            "rollout.available",
                            Some(serde_json::json!({
                                "namespace": &target.namespace,
                                "available": counts.available,
                            })),
                        );
                        return DeploymentRecord {
                            namespace: target.namespace.clone(),
                            artifact_ref: artifact.reference.clone(),
                            desired: target.replicas,
                            state: RolloutState::Available,
                            snapshot: Some(RolloutSnapshot {
                                counts,
                                pod_failures: Vec::new(),
                            }),
                            last_checked: Utc::now(),
                        };
                    }
                    self.sink.try_emit(
                        "rollout.progress",
                        Some(serde_json::json!({
                            "namespace": &target.namespace,
                            "desired": counts.desired,
                            "available": counts.available,
                        })),
                    );
                }
                Err(e) => {
                    // Status reads are transient by assumption; the
                    // deadline bounds how long that assumption holds.
                    tracing::warn!(
                        namespace = %target.namespace,
                        error = %e,
                        "Rollout status check failed"
                    );
                }
            }

            if Instant::now() >= deadline {
                let pod_failures = self
                    .cluster
                    .pod_failures(&target.deployment_name, &target.namespace)
                    .await;
                self.sink.try_emit(
                    "rollout.failed",
                    Some(serde_json::json!({
                        "namespace": &target.namespace,
                        "desired": last_counts.desired,
                        "available": last_counts.available,
                    })),
                );
                return DeploymentRecord {
                    namespace: target.namespace.clone(),
                    artifact_ref: artifact.reference.clone(),
                    desired: target.replicas,
                    state: RolloutState::Failed,
                    snapshot: Some(RolloutSnapshot {
                        counts: last_counts,
                        pod_failures,
                    }),
                    last_checked: Utc::now(),
                };
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
