//! Trigger events and the shared run context.

use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A source-change event that triggers one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEvent {
    /// The commit identifier; becomes the run's build identifier.
    pub commit: String,
    /// The branch the change landed on.
    pub branch: String,
}

impl SourceEvent {
    /// Creates a new source event.
    #[must_use]
    pub fn new(commit: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            commit: commit.into(),
            branch: branch.into(),
        }
    }
}

/// The shared execution context handed to every stage of a run.
///
/// Immutable for the lifetime of the run; stages receive it by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Unique id for this orchestrator invocation.
    pub run_id: Uuid,
    /// The build identifier keying this run's artifact (commit hash).
    pub build_id: String,
    /// The branch under build.
    pub branch: String,
    /// Working directory every stage action executes in.
    pub working_dir: PathBuf,
    /// Environment values passed to stage actions. Sorted for determinism.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl RunContext {
    /// Creates a run context from a trigger event.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the commit identifier is empty or
    /// contains non-hex characters after lowercasing.
    pub fn from_event(
        event: &SourceEvent,
        working_dir: impl Into<PathBuf>,
    ) -> Result<Self, ValidationError> {
        let build_id = normalize_build_id(&event.commit)?;
        Ok(Self {
            run_id: Uuid::new_v4(),
            build_id,
            branch: event.branch.clone(),
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
        })
    }

    /// Adds an environment value.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Normalizes a commit identifier into a build identifier.
///
/// Build identifiers are lowercase hex; registries reject mixed-case tags
/// and a stable key is required for the run log.
pub fn normalize_build_id(commit: &str) -> Result<String, ValidationError> {
    let normalized = commit.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Err(ValidationError::new("Build identifier cannot be empty"));
    }
    if !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::new(format!(
            "Build identifier '{normalized}' is not a hex commit hash"
        )));
    }
    Ok(normalized)
}

/// Computes a content digest over a set of source files.
///
/// Used as the build identifier when the trigger carries no commit hash
/// (e.g. a local dry run). Files are hashed in sorted path order so the
/// digest is independent of traversal order.
pub fn source_digest<P: AsRef<Path>>(files: &[P]) -> std::io::Result<String> {
    let mut paths: Vec<&Path> = files.iter().map(AsRef::as_ref).collect();
    paths.sort();

    let mut hasher = Sha256::new();
    for path in paths {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(std::fs::read(path)?);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_from_event() {
        let event = SourceEvent::new("ABC123", "main");
        let ctx = RunContext::from_event(&event, "/tmp/src").unwrap();

        assert_eq!(ctx.build_id, "abc123");
        assert_eq!(ctx.branch, "main");
        assert_eq!(ctx.working_dir, PathBuf::from("/tmp/src"));
    }

    #[test]
    fn test_normalize_build_id_lowercases() {
        assert_eq!(normalize_build_id("DEADBEEF").unwrap(), "deadbeef");
        assert_eq!(normalize_build_id(" abc123 ").unwrap(), "abc123");
    }

    #[test]
    fn test_normalize_build_id_rejects_bad_input() {
        assert!(normalize_build_id("").is_err());
        assert!(normalize_build_id("   ").is_err());
        assert!(normalize_build_id("not-a-hash!").is_err());
    }

    #[test]
    fn test_with_env() {
        let event = SourceEvent::new("abc123", "main");
        let ctx = RunContext::from_event(&event, "/tmp/src")
            .unwrap()
            .with_env("CI", "true")
            .with_env("REGISTRY", "registry.example.com");

        assert_eq!(ctx.env.get("CI").map(String::as_str), Some("true"));
        assert_eq!(ctx.env.len(), 2);
    }

    #[test]
    fn test_source_digest_is_order_independent() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let b = dir.path().join("b.py");
        std::fs::write(&a, "print('a')").unwrap();
        std::fs::write(&b, "print('b')").unwrap();

        let forward = source_digest(&[a.clone(), b.clone()]).unwrap();
        let reverse = source_digest(&[b, a]).unwrap();

        assert_eq!(forward, reverse);
        assert_eq!(forward.len(), 64);
        assert!(forward.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
