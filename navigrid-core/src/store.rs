//! Typed JSON file storage shared by the sign lexicon and the guide history.
//!
//! Reads distinguish a missing file (first run) from one that exists but does
//! not parse. Writes are atomic: the document goes to `{path}.tmp`, is flushed
//! and synced, then renamed over `{path}`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} does not hold a valid document: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PersistError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        PersistError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result of reading a store that may have been damaged.
#[derive(Debug)]
pub enum Loaded<T> {
    /// The file parsed.
    Found(T),
    /// No file on disk.
    Absent,
    /// The file existed but did not parse; it has been moved to `moved_to`.
    Quarantined { moved_to: PathBuf },
}

/// One JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling path with `suffix` appended to the full file name.
    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    pub fn temp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    pub fn corrupt_path(&self) -> PathBuf {
        self.sibling(".corrupt")
    }

    /// Read and parse the document. `Ok(None)` means the file does not exist.
    pub async fn read<T: DeserializeOwned>(&self) -> Result<Option<T>, PersistError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistError::io(&self.path, e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| PersistError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    /// Read the document, moving an unparseable file aside to
    /// `{path}.corrupt`. Failing to move it aside is an error.
    pub async fn read_or_quarantine<T: DeserializeOwned>(
        &self,
    ) -> Result<Loaded<T>, PersistError> {
        match self.read().await {
            Ok(Some(value)) => Ok(Loaded::Found(value)),
            Ok(None) => Ok(Loaded::Absent),
            Err(PersistError::Corrupt { source, .. }) => {
                let moved_to = self.quarantine().await?;
                warn!(
                    path = %self.path.display(),
                    moved_to = %moved_to.display(),
                    error = %source,
                    "store is corrupt, moved aside"
                );
                Ok(Loaded::Quarantined { moved_to })
            }
            Err(e) => Err(e),
        }
    }

    /// Rename the current file to `{path}.corrupt`, replacing any older one.
    pub async fn quarantine(&self) -> Result<PathBuf, PersistError> {
        let target = self.corrupt_path();
        fs::rename(&self.path, &target)
            .await
            .map_err(|e| PersistError::io(&self.path, e))?;
        Ok(target)
    }

    /// Serialize `value` as pretty JSON and atomically replace the file.
    pub async fn write<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), PersistError> {
        let mut content = serde_json::to_vec_pretty(value)?;
        content.push(b'\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PersistError::io(parent, e))?;
        }

        let tmp = self.temp_path();
        {
            let mut file = fs::File::create(&tmp)
                .await
                .map_err(|e| PersistError::io(&tmp, e))?;
            file.write_all(&content)
                .await
                .map_err(|e| PersistError::io(&tmp, e))?;
            file.flush().await.map_err(|e| PersistError::io(&tmp, e))?;
            file.sync_all().await.map_err(|e| PersistError::io(&tmp, e))?;
        }

        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| PersistError::io(&self.path, e))?;

        debug!(path = %self.path.display(), bytes = content.len(), "store written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_absent_file_reads_as_none() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let file = JsonFile::new(temp_dir.path().join("missing.json"));
        let value: Option<BTreeMap<String, String>> = file.read().await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_write_then_read_leaves_no_temp_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let file = JsonFile::new(temp_dir.path().join("store.json"));

        let mut map = BTreeMap::new();
        map.insert("main hall".to_string(), "main_hall".to_string());
        file.write(&map).await.expect("Write should succeed");

        assert!(file.path().exists());
        assert!(!file.temp_path().exists());
        let loaded: BTreeMap<String, String> = file.read().await.unwrap().unwrap();
        assert_eq!(loaded, map);
    }

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let file = JsonFile::new(temp_dir.path().join("state/nested/store.json"));
        file.write(&vec![1, 2, 3]).await.expect("Write should succeed");
        assert!(file.path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported_not_absent() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();

        let file = JsonFile::new(&path);
        let err = file.read::<BTreeMap<String, String>>().await.unwrap_err();
        assert!(matches!(err, PersistError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_quarantined() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("store.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let file = JsonFile::new(&path);
        let loaded = file
            .read_or_quarantine::<Vec<u32>>()
            .await
            .expect("Quarantine should succeed");

        match loaded {
            Loaded::Quarantined { moved_to } => {
                assert_eq!(moved_to, temp_dir.path().join("store.json.corrupt"));
                assert_eq!(std::fs::read_to_string(moved_to).unwrap(), "[1, 2");
            }
            other => panic!("expected quarantine, got {other:?}"),
        }
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_wrong_shape_counts_as_corrupt() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("store.json");
        std::fs::write(&path, r#"["a", "b"]"#).unwrap();

        let file = JsonFile::new(&path);
        let err = file.read::<BTreeMap<String, String>>().await.unwrap_err();
        assert!(matches!(err, PersistError::Corrupt { .. }));
    }
}
