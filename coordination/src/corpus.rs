//! Input corpus seam.
//!
//! The corpus collaborator hands the orchestrator an ordered list of
//! [`PaperManifest`] entries. Text is only loaded when a paper's turn comes,
//! through a [`PaperLoader`]; a [`DataError`] there skips the paper.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker appended when paper text is cut to the character budget.
pub const TRUNCATION_MARKER: &str = "\n...[TRUNCATED]...";

/// Rough characters-per-token ratio used for the text cap.
pub const CHARS_PER_TOKEN: usize = 4;

/// Errors locating or reading a paper.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("paper text not found: {0}")]
    Missing(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}

/// A paper waiting to be processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperManifest {
    pub paper_id: String,
    /// Location of the extracted plain text.
    pub text_path: PathBuf,
    pub ground_truth_decision: String,
    /// Mean human rating, when available.
    pub ground_truth_score: Option<f64>,
}

/// A paper ready for review: text already length-capped.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperRecord {
    pub paper_id: String,
    pub text: String,
    pub ground_truth_decision: String,
    pub ground_truth_score: Option<f64>,
}

/// Loads paper text for a manifest entry.
#[async_trait]
pub trait PaperLoader: Send + Sync {
    async fn load(&self, manifest: &PaperManifest) -> Result<PaperRecord, DataError>;
}

/// Cap `text` at `max_tokens * CHARS_PER_TOKEN` characters, appending
/// [`TRUNCATION_MARKER`] when anything was cut.
pub fn cap_text(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut capped = String::with_capacity(byte_idx + TRUNCATION_MARKER.len());
            capped.push_str(&text[..byte_idx]);
            capped.push_str(TRUNCATION_MARKER);
            capped
        }
        None => text.to_string(),
    }
}
