//! Bounded, persisted log of generated instructions.
//!
//! The history is only context for the instruction generator: nothing in the
//! navigation logic reads it back. Every append rewrites the whole file.

use crate::landmark::LandmarkId;
use crate::store::{JsonFile, Loaded, PersistError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Maximum number of entries kept on disk.
pub const MAX_HISTORY_ENTRIES: usize = 20;

/// Entries shown to the generator.
pub const CONTEXT_WINDOW: usize = 5;

/// One instruction exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub current: LandmarkId,
    pub next: LandmarkId,
    pub instruction: String,
    /// `"{step}/{last step}"` at the time the instruction was generated.
    pub progress: String,
}

/// On-disk document. `feedback` is carried through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryFile {
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub feedback: serde_json::Map<String, serde_json::Value>,
}

/// FIFO of recent instruction exchanges.
#[derive(Debug)]
pub struct InstructionHistory {
    document: HistoryFile,
    capacity: usize,
    file: JsonFile,
}

impl InstructionHistory {
    /// Load history from `path`. A missing file starts empty; a corrupt one
    /// is moved aside first.
    pub async fn load(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, PersistError> {
        let file = JsonFile::new(path);
        let capacity = capacity.max(1);

        let document = match file.read_or_quarantine::<HistoryFile>().await? {
            Loaded::Found(document) => document,
            Loaded::Absent | Loaded::Quarantined { .. } => HistoryFile::default(),
        };

        let mut history = Self {
            document,
            capacity,
            file,
        };
        history.trim();
        info!(
            path = %history.file.path().display(),
            entries = history.len(),
            "loaded instruction history"
        );
        Ok(history)
    }

    /// An empty history that writes to `path`.
    pub fn empty(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            document: HistoryFile::default(),
            capacity: capacity.max(1),
            file: JsonFile::new(path),
        }
    }

    /// Append an exchange, evicting the oldest past capacity, then persist.
    ///
    /// The entry stays in memory when the write fails.
    pub async fn record(&mut self, entry: HistoryEntry) -> Result<(), PersistError> {
        self.document.history.push(entry);
        self.trim();
        self.file.write(&self.document).await
    }

    /// The newest `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> &[HistoryEntry] {
        let entries = &self.document.history;
        &entries[entries.len().saturating_sub(n)..]
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.document.history
    }

    pub fn feedback(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.document.feedback
    }

    pub fn len(&self) -> usize {
        self.document.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn trim(&mut self) {
        let excess = self.document.history.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.document.history.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(i: usize) -> HistoryEntry {
        HistoryEntry {
            current: format!("node_{i}").into(),
            next: format!("node_{}", i + 1).into(),
            instruction: format!("Walk to node {}.", i + 1),
            progress: format!("{i}/30"),
        }
    }

    #[tokio::test]
    async fn test_fifo_eviction() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut history =
            InstructionHistory::empty(temp_dir.path().join("history.json"), MAX_HISTORY_ENTRIES);

        for i in 0..25 {
            history.record(entry(i)).await.unwrap();
        }

        assert_eq!(history.len(), 20);
        assert_eq!(history.entries()[0], entry(5));
        assert_eq!(history.recent(CONTEXT_WINDOW).len(), 5);
        assert_eq!(history.recent(CONTEXT_WINDOW)[4], entry(24));
    }

    #[tokio::test]
    async fn test_recent_with_short_history() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut history = InstructionHistory::empty(temp_dir.path().join("h.json"), 20);
        assert!(history.recent(5).is_empty());
        history.record(entry(0)).await.unwrap();
        history.record(entry(1)).await.unwrap();
        assert_eq!(history.recent(5), &[entry(0), entry(1)]);
    }

    #[tokio::test]
    async fn test_feedback_survives_rewrite() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("guide_history.json");
        std::fs::write(
            &path,
            r#"{"history": [], "feedback": {"stairs": {"helpful": false}}}"#,
        )
        .unwrap();

        let mut history = InstructionHistory::load(&path, 20).await.unwrap();
        history.record(entry(0)).await.unwrap();

        let reloaded = InstructionHistory::load(&path, 20).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.feedback()["stairs"]["helpful"], false);
    }

    #[tokio::test]
    async fn test_oversized_file_keeps_newest() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("guide_history.json");
        let document = HistoryFile {
            history: (0..30).map(entry).collect(),
            feedback: Default::default(),
        };
        std::fs::write(&path, serde_json::to_string(&document).unwrap()).unwrap();

        let history = InstructionHistory::load(&path, 20).await.unwrap();
        assert_eq!(history.len(), 20);
        assert_eq!(history.entries()[0], entry(10));
    }

    #[tokio::test]
    async fn test_absent_and_corrupt_start_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("guide_history.json");

        let history = InstructionHistory::load(&path, 20).await.unwrap();
        assert!(history.is_empty());
        assert!(!path.exists());

        std::fs::write(&path, "not json").unwrap();
        let history = InstructionHistory::load(&path, 20).await.unwrap();
        assert!(history.is_empty());
        assert!(temp_dir.path().join("guide_history.json.corrupt").exists());
    }
}
