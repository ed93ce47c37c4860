//! Error types for the gantry orchestrator.
//!
//! Gate halts and rollout timeouts are deliberately *not* errors: a halted
//! run and a failed rollout are expected, reportable outcomes carried by
//! `PipelineRun` and `DeploymentRecord`. The types here cover everything
//! that genuinely went wrong while orchestrating.

use crate::core::PipelineStatus;
use thiserror::Error;

/// The main error type for gantry operations.
#[derive(Debug, Error)]
pub enum GantryError {
    /// A pipeline or context validation error occurred.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Artifact promotion failed.
    #[error("{0}")]
    Promotion(#[from] PromotionError),

    /// A deployment step failed.
    #[error("{0}")]
    Deploy(#[from] DeployError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (run log, findings file, working directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised when pipeline or context validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error, if any.
    pub stages: Vec<String>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

/// Errors raised while promoting a build artifact to the registry.
///
/// Promotion failures are reported against the promotion step only; they
/// never retroactively change the owning run's status.
#[derive(Debug, Clone, Error)]
pub enum PromotionError {
    /// The owning pipeline run did not pass, so no artifact may be promoted.
    #[error("Cannot promote artifact: pipeline run status is '{status}', not 'passed'")]
    RunNotPassed {
        /// The run's actual status.
        status: PipelineStatus,
    },

    /// The registry rejected the credentials.
    #[error("Registry authentication failed for '{reference}': {reason}")]
    Auth {
        /// The image reference being pushed.
        reference: String,
        /// The reason reported by the registry.
        reason: String,
    },

    /// All retry attempts were exhausted; rejections (quota, tag policy,
    /// network reset) are retried and reported here with the final reason.
    #[error("Push of '{reference}' failed after {attempts} attempts: {last_error}")]
    Exhausted {
        /// The image reference being pushed.
        reference: String,
        /// Number of attempts made.
        attempts: usize,
        /// The final error message.
        last_error: String,
    },
}

/// Errors raised while applying a deployment to the cluster.
#[derive(Debug, Clone, Error)]
pub enum DeployError {
    /// The deployment template is missing its image placeholder.
    #[error("Deployment template has no '{placeholder}' placeholder")]
    BadTemplate {
        /// The expected placeholder token.
        placeholder: String,
    },

    /// A deployment was requested for an artifact that was never published.
    #[error("Refusing to deploy unpublished artifact '{reference}'")]
    UnpublishedArtifact {
        /// The unpublished artifact reference.
        reference: String,
    },

    /// Namespace creation failed after retries.
    #[error("Failed to ensure namespace '{namespace}': {reason}")]
    NamespaceEnsure {
        /// The target namespace.
        namespace: String,
        /// The reason for failure.
        reason: String,
    },

    /// The API server rejected the rendered manifest after retries.
    #[error("Manifest apply rejected in namespace '{namespace}': {reason}")]
    Apply {
        /// The target namespace.
        namespace: String,
        /// The reason for rejection.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("duplicate stage name 'build'")
            .with_stages(vec!["build".to_string()]);
        assert_eq!(err.to_string(), "duplicate stage name 'build'");
        assert_eq!(err.stages, vec!["build"]);
    }

    #[test]
    fn test_promotion_error_display() {
        let err = PromotionError::RunNotPassed {
            status: PipelineStatus::Failed,
        };
        assert!(err.to_string().contains("'failed'"));

        let err = PromotionError::Exhausted {
            reference: "registry.example.com/team/app:abc123".to_string(),
            attempts: 3,
            last_error: "connection reset".to_string(),
        };
        assert!(err.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_deploy_error_display() {
        let err = DeployError::BadTemplate {
            placeholder: "{{IMAGE}}".to_string(),
        };
        assert!(err.to_string().contains("{{IMAGE}}"));
    }

    #[test]
    fn test_gantry_error_from() {
        let err: GantryError = ValidationError::new("empty pipeline").into();
        assert!(matches!(err, GantryError::Validation(_)));

        let err: GantryError = DeployError::UnpublishedArtifact {
            reference: "app:abc".to_string(),
        }
        .into();
        assert!(matches!(err, GantryError::Deploy(_)));
    }
}
