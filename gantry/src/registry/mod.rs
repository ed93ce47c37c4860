//! Image references, the registry seam, and artifact promotion.

use crate::errors::PromotionError;
use crate::events::{EventSink, NoOpEventSink};
use crate::pipeline::PipelineRun;
use crate::retry::{with_retry, RetryConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A canonical container image reference: `registry/namespace/repo`.
///
/// Registries commonly reject mixed-case references, so the reference is
/// lowercased on construction. Normalization is idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    /// Creates a normalized image reference.
    #[must_use]
    pub fn new(reference: impl AsRef<str>) -> Self {
        Self(Self::normalize(reference.as_ref()))
    }

    /// Lowercases and trims a raw reference. Idempotent:
    /// `normalize(normalize(x)) == normalize(x)`.
    #[must_use]
    pub fn normalize(raw: &str) -> String {
        raw.trim().to_ascii_lowercase()
    }

    /// Returns the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the reference tagged with a build identifier.
    #[must_use]
    pub fn tagged(&self, tag: &str) -> String {
        format!("{}:{}", self.0, tag.to_ascii_lowercase())
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An error reported by a registry push.
#[derive(Debug, Clone, Error)]
pub enum PushError {
    /// The registry rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// The push was rejected (network interruption, quota, tag policy).
    #[error("push rejected: {0}")]
    Rejected(String),
}

/// The external registry seam.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Pushes an image tag to the registry.
    async fn push(&self, image: &ImageRef, tag: &str) -> Result<(), PushError>;
}

/// Promotion status of a build artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStatus {
    /// The artifact exists locally but has not been pushed.
    Unpublished,
    /// The artifact has been pushed to the registry.
    Published,
}

/// A build artifact, keyed by its owning run's build identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// The full tagged reference, e.g. `registry.example.com/team/app:abc123`.
    pub reference: String,
    /// Whether the artifact has been published.
    pub status: PromotionStatus,
}

impl Artifact {
    /// Returns true if the artifact has been published.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.status == PromotionStatus::Published
    }
}

/// Publishes build artifacts for passed pipeline runs.
pub struct ArtifactPromoter {
    registry: Arc<dyn Registry>,
    retry: RetryConfig,
    sink: Arc<dyn EventSink>,
}

impl ArtifactPromoter {
    /// Creates a promoter against a registry.
    #[must_use]
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            retry: RetryConfig::default(),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the retry configuration for pushes.
    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Promotes the run's artifact: tags the source image with the run's
    /// build identifier and pushes it.
    ///
    /// # Errors
    ///
    /// Returns `PromotionError::RunNotPassed` unless the run's status is
    /// `passed`: an artifact is promoted if and only if its run passed.
    /// Push failures are retried with bounded backoff;
    /// exhaustion surfaces `PromotionError` without touching the run.
    pub async fn promote(
        &self,
        run: &PipelineRun,
        source: &ImageRef,
    ) -> Result<Artifact, PromotionError> {
        if !run.status.is_success() {
            return Err(PromotionError::RunNotPassed { status: run.status });
        }

        let reference = source.tagged(&run.build_id);

        let push = with_retry(&self.retry, "registry.push", || {
            self.registry.push(source, &run.build_id)
        })
        .await;

        if let Err(exhausted) = push {
            return Err(match exhausted.last_error {
                PushError::Auth(reason) => PromotionError::Auth { reference, reason },
                PushError::Rejected(reason) => PromotionError::Exhausted {
                    reference,
                    attempts: exhausted.attempts,
                    last_error: reason,
                },
            });
        }

        self.sink.try_emit(
            "artifact.published",
            Some(serde_json::json!({
                "reference": &reference,
                "build_id": &run.build_id,
            })),
        );

        Ok(Artifact {
            reference,
            status: PromotionStatus::Published,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PipelineStatus;
    use crate::retry::JitterStrategy;
    use crate::testing::MockRegistry;
    use chrono::Utc;

    fn run_with_status(status: PipelineStatus) -> PipelineRun {
        PipelineRun {
            pipeline: "demo".to_string(),
            build_id: "abc123".to_string(),
            status,
            results: Vec::new(),
            warnings: Vec::new(),
            cancel_reason: None,
            finished_at: Utc::now(),
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(3)
            .with_base_delay_ms(1)
            .with_jitter(JitterStrategy::None)
    }

    #[test]
    fn test_normalize_is_idempotent_and_lowercase() {
        let raw = "  Registry.Example.COM/Team/App ";
        let once = ImageRef::normalize(raw);
        let twice = ImageRef::normalize(&once);

        assert_eq!(once, twice);
        assert_eq!(once, "registry.example.com/team/app");
    }

    #[test]
    fn test_tagged_reference() {
        let image = ImageRef::new("Registry.Example.com/Team/App");
        assert_eq!(
            image.tagged("ABC123"),
            "registry.example.com/team/app:abc123"
        );
    }

    #[tokio::test]
    async fn test_promote_passed_run() {
        let registry = Arc::new(MockRegistry::new());
        let promoter = ArtifactPromoter::new(registry.clone()).with_retry_config(fast_retry());

        let artifact = promoter
            .promote(&run_with_status(PipelineStatus::Passed), &ImageRef::new("r.example.com/t/app"))
            .await
            .unwrap();

        assert!(artifact.is_published());
        assert_eq!(artifact.reference, "r.example.com/t/app:abc123");
        assert_eq!(registry.pushes().len(), 1);
    }

    #[tokio::test]
    async fn test_promote_refuses_failed_run() {
        let registry = Arc::new(MockRegistry::new());
        let promoter = ArtifactPromoter::new(registry.clone());

        let err = promoter
            .promote(&run_with_status(PipelineStatus::Failed), &ImageRef::new("r/t/app"))
            .await
            .unwrap_err();

        assert!(matches!(err, PromotionError::RunNotPassed { .. }));
        assert!(registry.pushes().is_empty());
    }

    #[tokio::test]
    async fn test_promote_retries_transient_rejections() {
        let registry = Arc::new(MockRegistry::new().failing_times(2));
        let promoter = ArtifactPromoter::new(registry.clone()).with_retry_config(fast_retry());

        let artifact = promoter
            .promote(&run_with_status(PipelineStatus::Passed), &ImageRef::new("r/t/app"))
            .await
            .unwrap();

        assert!(artifact.is_published());
        assert_eq!(registry.pushes().len(), 1);
    }

    #[tokio::test]
    async fn test_promote_auth_failure_surfaces_auth_error() {
        let registry = Arc::new(MockRegistry::new().auth_failing());
        let promoter = ArtifactPromoter::new(registry.clone()).with_retry_config(fast_retry());

        let err = promoter
            .promote(&run_with_status(PipelineStatus::Passed), &ImageRef::new("r/t/app"))
            .await
            .unwrap_err();

        match err {
            PromotionError::Auth { reference, reason } => {
                assert_eq!(reference, "r/t/app:abc123");
                assert!(reason.contains("invalid credentials"));
            }
            other => panic!("expected auth error, got {other}"),
        }
        assert!(registry.pushes().is_empty());
    }

    #[tokio::test]
    async fn test_promote_exhaustion_surfaces_error() {
        let registry = Arc::new(MockRegistry::new().failing_times(10));
        let promoter = ArtifactPromoter::new(registry).with_retry_config(fast_retry());

        let err = promoter
            .promote(&run_with_status(PipelineStatus::Passed), &ImageRef::new("r/t/app"))
            .await
            .unwrap_err();

        match err {
            PromotionError::Exhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected exhausted, got {other}"),
        }
    }
}
