//! Artifact persistence: checkpoints, batch output, flattened table.
//!
//! All writes go to a sibling temp file first and are renamed into place,
//! so a reader (or a crash) never observes a half-written checkpoint.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::record::BatchResult;

/// Error during persistence operations. Always fatal to a run.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialize failed: {0}")]
    Serialize(String),

    #[error("deserialize failed for {path}: {reason}")]
    Deserialize { path: PathBuf, reason: String },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write `contents` to `path` via temp file + rename, creating parent dirs.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(io_err(parent))?;
    }

    let temp_path = temp_path_for(path);
    tokio::fs::write(&temp_path, contents)
        .await
        .map_err(io_err(&temp_path))?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(io_err(path))?;
    Ok(())
}

/// Pretty-print `value` as JSON and write it atomically.
pub async fn write_json<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| PersistenceError::Serialize(e.to_string()))?;
    write_atomic(path, json.as_bytes()).await
}

/// Read a batch (checkpoint or final output) back from disk.
pub async fn load_batch(path: &Path) -> Result<BatchResult, PersistenceError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(io_err(path))?;
    serde_json::from_str(&json).map_err(|e| PersistenceError::Deserialize {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Single writer for the running checkpoint file.
///
/// Owned by exactly one task; each call overwrites the file with the
/// complete set of papers finished so far.
#[derive(Debug)]
pub struct CheckpointWriter {
    path: PathBuf,
    writes: u32,
}

impl CheckpointWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> u32 {
        self.writes
    }

    /// Overwrite the checkpoint with `papers`.
    pub async fn write<T: Serialize + ?Sized>(&mut self, papers: &T) -> Result<(), PersistenceError> {
        write_json(&self.path, papers).await?;
        self.writes += 1;
        debug!(path = %self.path.display(), writes = self.writes, "checkpoint written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::record::PaperResult;
    use crate::review::{Review, ReviewSet};

    fn paper(id: &str) -> PaperResult {
        let mut reviews = ReviewSet::new();
        reviews.insert("A", Review::fallback());
        PaperResult {
            paper_id: id.to_string(),
            ground_truth_decision: "Accept".to_string(),
            ground_truth_score: None,
            reviews_round_0: reviews.clone(),
            reviews_round_1: reviews,
        }
    }

    #[tokio::test]
    async fn test_write_and_load_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/results.json");

        let batch = vec![paper("p1"), paper("p2")];
        write_json(&path, &batch).await.unwrap();

        let restored = load_batch(&path).await.unwrap();
        assert_eq!(restored, batch);
        assert!(!temp_path_for(&path).exists());
    }

    #[tokio::test]
    async fn test_checkpoint_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CheckpointWriter::new(dir.path().join("partial.json"));

        writer.write(&vec![paper("p1")]).await.unwrap();
        writer.write(&vec![paper("p1"), paper("p2")]).await.unwrap();

        assert_eq!(writer.writes(), 2);
        let restored = load_batch(writer.path()).await.unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[1].paper_id, "p2");
    }

    #[tokio::test]
    async fn test_load_corrupt_batch_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let err = load_batch(&path).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Deserialize { .. }));
    }

    #[tokio::test]
    async fn test_load_missing_batch_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_batch(&dir.path().join("absent.json")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Io { .. }));
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let tmp = temp_path_for(Path::new("results/partial.json"));
        assert_eq!(tmp, PathBuf::from("results/partial.json.tmp"));
    }
}
