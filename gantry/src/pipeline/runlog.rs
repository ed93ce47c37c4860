//! Append-only run log.
//!
//! Every stage result is appended exactly once, keyed by the run's build
//! identifier. The log must be durable before the controller returns, so
//! the file-backed implementation flushes and syncs on every append.

use crate::core::StageResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// One line of the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogRecord {
    /// The build identifier keying the run.
    pub build_id: String,
    /// The recorded stage result.
    pub result: StageResult,
}

/// An append-only log of stage results.
///
/// Implementations must be safe to share across concurrently-executing
/// runs; records from different runs are distinguished by `build_id`.
pub trait RunLog: Send + Sync {
    /// Appends a stage result for the given run. Must be durable on return.
    fn append(&self, build_id: &str, result: &StageResult) -> std::io::Result<()>;
}

/// A run log held in memory. Used in tests and short-lived embeddings.
#[derive(Debug, Default)]
pub struct MemoryRunLog {
    records: parking_lot::RwLock<Vec<RunLogRecord>>,
}

impl MemoryRunLog {
    /// Creates an empty in-memory run log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all records for a given build identifier.
    #[must_use]
    pub fn records_for(&self, build_id: &str) -> Vec<RunLogRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.build_id == build_id)
            .cloned()
            .collect()
    }

    /// Returns the total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl RunLog for MemoryRunLog {
    fn append(&self, build_id: &str, result: &StageResult) -> std::io::Result<()> {
        self.records.write().push(RunLogRecord {
            build_id: build_id.to_string(),
            result: result.clone(),
        });
        Ok(())
    }
}

/// A run log persisted as JSON lines, one record per line.
#[derive(Debug)]
pub struct JsonlRunLog {
    file: Mutex<File>,
}

impl JsonlRunLog {
    /// Opens (or creates) a run log file in append mode.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl RunLog for JsonlRunLog {
    fn append(&self, build_id: &str, result: &StageResult) -> std::io::Result<()> {
        let record = RunLogRecord {
            build_id: build_id.to_string(),
            result: result.clone(),
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut file = self.file.lock();
        writeln!(file, "{line}")?;
        file.flush()?;
        file.sync_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageResult;

    #[test]
    fn test_memory_log_keyed_by_build_id() {
        let log = MemoryRunLog::new();
        log.append("abc123", &StageResult::passed("build", 0, Vec::new()))
            .unwrap();
        log.append("def456", &StageResult::passed("build", 0, Vec::new()))
            .unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log.records_for("abc123").len(), 1);
        assert_eq!(log.records_for("def456").len(), 1);
        assert!(log.records_for("missing").is_empty());
    }

    #[test]
    fn test_jsonl_log_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");

        let log = JsonlRunLog::open(&path).unwrap();
        log.append("abc123", &StageResult::passed("secrets", 0, Vec::new()))
            .unwrap();
        log.append("abc123", &StageResult::skipped("push", "halted"))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let records: Vec<RunLogRecord> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].build_id, "abc123");
        assert_eq!(records[0].result.stage, "secrets");
        assert_eq!(records[1].result.stage, "push");
    }

    #[test]
    fn test_jsonl_log_appends_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");

        {
            let log = JsonlRunLog::open(&path).unwrap();
            log.append("abc123", &StageResult::passed("a", 0, Vec::new()))
                .unwrap();
        }
        {
            let log = JsonlRunLog::open(&path).unwrap();
            log.append("abc123", &StageResult::passed("b", 0, Vec::new()))
                .unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
