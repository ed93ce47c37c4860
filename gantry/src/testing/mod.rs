//! Scripted fakes for the external seams.
//!
//! These back the crate's own tests and are exported for downstream
//! integration testing against the `StageAction`, `Registry`, and
//! `Cluster` seams without real tools, registries, or clusters.

use crate::context::RunContext;
use crate::deploy::{Cluster, ClusterError, ReplicaCounts};
use crate::registry::{ImageRef, PushError, Registry};
use crate::stage::{ActionOutcome, StageAction};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A stage action that replays a scripted sequence of outcomes.
///
/// When the script is exhausted, further invocations exit 0. A hanging
/// action never completes; use it to exercise stage timeouts.
#[derive(Debug, Default)]
pub struct ScriptedAction {
    script: Mutex<VecDeque<Result<ActionOutcome, String>>>,
    hang: bool,
    invocations: AtomicUsize,
}

impl ScriptedAction {
    /// Creates an action that always exits 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an action that never completes.
    #[must_use]
    pub fn hanging() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            hang: true,
            invocations: AtomicUsize::new(0),
        }
    }

    /// Queues an exit code.
    #[must_use]
    pub fn then_exit(self, code: i32) -> Self {
        self.script.lock().push_back(Ok(ActionOutcome::exit(code)));
        self
    }

    /// Queues an exit code with a report.
    #[must_use]
    pub fn then_report(self, code: i32, report: impl Into<String>) -> Self {
        self.script
            .lock()
            .push_back(Ok(ActionOutcome::with_report(code, report)));
        self
    }

    /// Queues a spawn failure.
    #[must_use]
    pub fn then_error(self, message: impl Into<String>) -> Self {
        self.script.lock().push_back(Err(message.into()));
        self
    }

    /// Number of times the action has been invoked.
    #[must_use]
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageAction for ScriptedAction {
    async fn run(&self, _ctx: &RunContext) -> std::io::Result<ActionOutcome> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        if self.hang {
            futures::future::pending::<()>().await;
            unreachable!("pending future completed");
        }

        match self.script.lock().pop_front() {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(std::io::Error::other(message)),
            None => Ok(ActionOutcome::exit(0)),
        }
    }
}

/// A registry fake that records pushes and can fail on demand.
#[derive(Debug, Default)]
pub struct MockRegistry {
    pushes: RwLock<Vec<(String, String)>>,
    rejections_remaining: AtomicUsize,
    auth_fails: bool,
}

impl MockRegistry {
    /// Creates a registry that accepts every push.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the next `n` pushes with a transient error.
    #[must_use]
    pub fn failing_times(self, n: usize) -> Self {
        self.rejections_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Fails every push with an authentication error.
    #[must_use]
    pub fn auth_failing(mut self) -> Self {
        self.auth_fails = true;
        self
    }

    /// Returns the recorded `(image, tag)` pushes.
    #[must_use]
    pub fn pushes(&self) -> Vec<(String, String)> {
        self.pushes.read().clone()
    }
}

#[async_trait]
impl Registry for MockRegistry {
    async fn push(&self, image: &ImageRef, tag: &str) -> Result<(), PushError> {
        if self.auth_fails {
            return Err(PushError::Auth("invalid credentials".to_string()));
        }
        if self
            .rejections_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PushError::Rejected("connection reset".to_string()));
        }
        self.pushes
            .write()
            .push((image.as_str().to_string(), tag.to_string()));
        Ok(())
    }
}

/// A cluster fake with a namespace set, applied-manifest log, and a
/// scripted rollout progression.
#[derive(Debug, Default)]
pub struct MockCluster {
    namespaces: RwLock<HashSet<String>>,
    ensure_calls: AtomicUsize,
    applied: RwLock<Vec<String>>,
    namespace_failures: AtomicUsize,
    apply_failures: AtomicUsize,
    rollout_desired: u32,
    rollout_progression: Vec<u32>,
    rollout_polls: AtomicUsize,
    pod_failure_reasons: RwLock<Vec<String>>,
}

impl MockCluster {
    /// Creates a cluster whose rollouts complete immediately.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rollout_desired: 1,
            rollout_progression: vec![1],
            ..Self::default()
        }
    }

    /// Scripts the available-replica count reported by successive polls.
    /// The last value repeats once the script is exhausted.
    #[must_use]
    pub fn with_rollout_progression(mut self, desired: u32, progression: Vec<u32>) -> Self {
        self.rollout_desired = desired;
        self.rollout_progression = progression;
        self
    }

    /// Fails the next `n` namespace ensures.
    #[must_use]
    pub fn failing_namespace_times(self, n: usize) -> Self {
        self.namespace_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Fails the next `n` applies.
    #[must_use]
    pub fn failing_apply_times(self, n: usize) -> Self {
        self.apply_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Sets the pod failure reasons returned for diagnostics.
    #[must_use]
    pub fn with_pod_failures(self, reasons: Vec<String>) -> Self {
        *self.pod_failure_reasons.write() = reasons;
        self
    }

    /// Returns true if the namespace exists.
    #[must_use]
    pub fn has_namespace(&self, name: &str) -> bool {
        self.namespaces.read().contains(name)
    }

    /// Number of namespaces in the cluster.
    #[must_use]
    pub fn namespace_count(&self) -> usize {
        self.namespaces.read().len()
    }

    /// Number of `ensure_namespace` calls observed.
    #[must_use]
    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    /// Returns the applied manifests.
    #[must_use]
    pub fn applied(&self) -> Vec<String> {
        self.applied.read().clone()
    }
}

#[async_trait]
impl Cluster for MockCluster {
    async fn ensure_namespace(&self, name: &str) -> Result<(), ClusterError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .namespace_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ClusterError::new("api server unavailable"));
        }
        // Insert is a no-op when present: create-if-absent, never an error.
        self.namespaces.write().insert(name.to_string());
        Ok(())
    }

    async fn apply(&self, manifest: &str) -> Result<(), ClusterError> {
        if self
            .apply_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ClusterError::new("conflict: object being modified"));
        }
        self.applied.write().push(manifest.to_string());
        Ok(())
    }

    async fn rollout_status(
        &self,
        _deployment: &str,
        _namespace: &str,
    ) -> Result<ReplicaCounts, ClusterError> {
        let poll = self.rollout_polls.fetch_add(1, Ordering::SeqCst);
        let index = poll.min(self.rollout_progression.len().saturating_sub(1));
        let available = self.rollout_progression.get(index).copied().unwrap_or(0);
        Ok(ReplicaCounts {
            desired: self.rollout_desired,
            available,
        })
    }

    async fn pod_failures(&self, _deployment: &str, _namespace: &str) -> Vec<String> {
        self.pod_failure_reasons.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SourceEvent;

    fn ctx() -> RunContext {
        RunContext::from_event(&SourceEvent::new("abc123", "main"), "/tmp").unwrap()
    }

    #[tokio::test]
    async fn test_scripted_action_replays_in_order() {
        let action = ScriptedAction::new().then_exit(1).then_report(0, "[]");

        assert_eq!(action.run(&ctx()).await.unwrap().exit_code, 1);
        let second = action.run(&ctx()).await.unwrap();
        assert_eq!(second.exit_code, 0);
        assert_eq!(second.report.as_deref(), Some("[]"));
        // Exhausted script defaults to exit 0.
        assert_eq!(action.run(&ctx()).await.unwrap().exit_code, 0);
        assert_eq!(action.invocations(), 3);
    }

    #[tokio::test]
    async fn test_mock_registry_failures_then_success() {
        let registry = MockRegistry::new().failing_times(1);
        let image = ImageRef::new("r/t/app");

        assert!(registry.push(&image, "abc").await.is_err());
        assert!(registry.push(&image, "abc").await.is_ok());
        assert_eq!(registry.pushes().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_cluster_namespace_idempotent() {
        let cluster = MockCluster::new();

        cluster.ensure_namespace("demo").await.unwrap();
        cluster.ensure_namespace("demo").await.unwrap();

        assert_eq!(cluster.namespace_count(), 1);
        assert_eq!(cluster.ensure_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_cluster_rollout_progression_repeats_last() {
        let cluster = MockCluster::new().with_rollout_progression(3, vec![1, 2]);

        let first = cluster.rollout_status("d", "ns").await.unwrap();
        let second = cluster.rollout_status("d", "ns").await.unwrap();
        let third = cluster.rollout_status("d", "ns").await.unwrap();

        assert_eq!(first.available, 1);
        assert_eq!(second.available, 2);
        assert_eq!(third.available, 2);
    }
}
