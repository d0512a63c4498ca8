//! On-disk ICLR corpus: ratings manifest plus extracted paper text.
//!
//! Layout under the data directory:
//!
//! ```text
//! ratings_subset.tsv        paper_id  decision  0  1  2 ...   (tab-separated)
//! iclr_parsed/<id>.txt      extracted plain text
//! ```

use std::path::Path;

use async_trait::async_trait;
use coordination::{cap_text, DataError, PaperLoader, PaperManifest, PaperRecord};
use tracing::{debug, info};

pub const RATINGS_FILE: &str = "ratings_subset.tsv";
pub const TEXT_DIR: &str = "iclr_parsed";

/// Build the ordered manifest: rows with a matching text file, capped at `limit`.
pub async fn load_manifest(
    data_dir: &Path,
    limit: Option<usize>,
) -> Result<Vec<PaperManifest>, DataError> {
    let ratings_path = data_dir.join(RATINGS_FILE);
    let tsv = tokio::fs::read_to_string(&ratings_path)
        .await
        .map_err(read_error(&ratings_path))?;

    let text_dir = data_dir.join(TEXT_DIR);
    let rows = parse_ratings(&tsv, &text_dir)?;
    let total = rows.len();

    let mut manifest = Vec::with_capacity(total);
    for row in rows {
        let exists = tokio::fs::metadata(&row.text_path)
            .await
            .is_ok_and(|m| m.is_file());
        if exists {
            manifest.push(row);
        } else {
            debug!(paper_id = %row.paper_id, "no extracted text, leaving out of manifest");
        }
    }
    let matched = manifest.len();
    if let Some(limit) = limit {
        manifest.truncate(limit);
    }

    info!(
        rows = total,
        matched,
        selected = manifest.len(),
        "corpus manifest loaded"
    );
    Ok(manifest)
}

fn read_error(path: &Path) -> impl FnOnce(std::io::Error) -> DataError + '_ {
    move |source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            DataError::Missing(path.to_path_buf())
        } else {
            DataError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Parse the ratings TSV. Does not touch the filesystem.
///
/// Ground-truth score is the mean of the parseable numeric-named columns.
pub fn parse_ratings(tsv: &str, text_dir: &Path) -> Result<Vec<PaperManifest>, DataError> {
    let mut lines = tsv.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| DataError::InvalidManifest("empty ratings file".into()))?
        .split('\t')
        .map(str::trim)
        .collect();

    let column = |name: &str| {
        header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| DataError::InvalidManifest(format!("missing column `{name}`")))
    };
    let id_col = column("paper_id")?;
    let decision_col = column("decision")?;
    let rating_cols: Vec<usize> = header
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.is_empty() && h.chars().all(|c| c.is_ascii_digit()))
        .map(|(i, _)| i)
        .collect();

    let mut manifest = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        let paper_id = fields.get(id_col).copied().unwrap_or_default();
        if paper_id.is_empty() {
            continue;
        }

        let ratings: Vec<f64> = rating_cols
            .iter()
            .filter_map(|&i| fields.get(i)?.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .collect();
        let ground_truth_score =
            (!ratings.is_empty()).then(|| ratings.iter().sum::<f64>() / ratings.len() as f64);

        manifest.push(PaperManifest {
            paper_id: paper_id.to_string(),
            text_path: text_dir.join(format!("{paper_id}.txt")),
            ground_truth_decision: fields.get(decision_col).copied().unwrap_or_default().to_string(),
            ground_truth_score,
        });
    }
    Ok(manifest)
}

/// Reads paper text from disk at processing time and caps its length.
#[derive(Debug, Clone)]
pub struct FsPaperLoader {
    max_tokens: usize,
}

impl FsPaperLoader {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }
}

#[async_trait]
impl PaperLoader for FsPaperLoader {
    async fn load(&self, manifest: &PaperManifest) -> Result<PaperRecord, DataError> {
        let text = tokio::fs::read_to_string(&manifest.text_path)
            .await
            .map_err(read_error(&manifest.text_path))?;

        Ok(PaperRecord {
            paper_id: manifest.paper_id.clone(),
            text: cap_text(&text, self.max_tokens),
            ground_truth_decision: manifest.ground_truth_decision.clone(),
            ground_truth_score: manifest.ground_truth_score,
        })
    }
}
