//! Result aggregation: flattening and debate dynamics.
//!
//! Pure transformations over a batch of `PaperResult`s. Nothing here touches disk;
//! the caller decides where the rendered table goes.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::debate::PaperResult;
use crate::review::ReviewSet;

/// One cell of a flattened row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Score(u8),
    Number(f64),
    Empty,
}

impl Cell {
    fn render(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Score(n) => n.to_string(),
            Self::Number(x) => format!("{x:?}"),
            Self::Empty => String::new(),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(s) => serializer.serialize_str(s),
            Self::Score(n) => serializer.serialize_u8(*n),
            Self::Number(x) => serializer.serialize_f64(*x),
            Self::Empty => serializer.serialize_none(),
        }
    }
}

/// A flattened paper: ordered `(column, cell)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRow {
    cells: Vec<(String, Cell)>,
}

impl FlatRow {
    fn push(&mut self, column: impl Into<String>, cell: Cell) {
        self.cells.push((column.into(), cell));
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    /// Numeric value of `column`, if it holds a score or number.
    pub fn number(&self, column: &str) -> Option<f64> {
        match self.get(column)? {
            Cell::Score(n) => Some(f64::from(*n)),
            Cell::Number(x) => Some(*x),
            _ => None,
        }
    }
}

impl Serialize for FlatRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, cell) in &self.cells {
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

/// One agent whose score moved between rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreChange {
    pub paper_id: String,
    pub agent: String,
    pub score_0: u8,
    pub score_1: u8,
}

/// Batch-level debate dynamics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateSummary {
    pub papers: usize,
    /// Mean of per-paper average scores, Round 0.
    pub mean_score_0: f64,
    pub mean_score_1: f64,
    /// Mean of per-paper population variance across agents, Round 0.
    pub mean_variance_0: f64,
    pub mean_variance_1: f64,
    /// Fallback reviews seen per round.
    pub fallbacks_0: usize,
    pub fallbacks_1: usize,
    pub changes: Vec<ScoreChange>,
}

/// Folds nested per-paper results into tables and summaries.
pub struct ResultAggregator;

impl ResultAggregator {
    /// One row per paper:
    /// `paper_id, gt_decision, gt_score, score_0_<agent>…, avg_score_0, score_1_<agent>…, avg_score_1`.
    pub fn flatten(batch: &[PaperResult]) -> Vec<FlatRow> {
        batch.iter().map(flatten_paper).collect()
    }

    /// Render rows as CSV. Header is the union of columns in first-seen
    /// order; a row missing a column gets an empty cell.
    pub fn render_csv(rows: &[FlatRow]) -> String {
        let mut header: Vec<&str> = Vec::new();
        for row in rows {
            for column in row.columns() {
                if !header.contains(&column) {
                    header.push(column);
                }
            }
        }

        let mut out = String::new();
        push_record(&mut out, header.iter().map(|c| c.to_string()));
        for row in rows {
            push_record(
                &mut out,
                header
                    .iter()
                    .map(|c| row.get(c).map(Cell::render).unwrap_or_default()),
            );
        }
        out
    }

    /// Mean scores, mean disagreement, and per-agent movement across rounds.
    pub fn summarize(batch: &[PaperResult]) -> DebateSummary {
        let mut changes = Vec::new();
        for paper in batch {
            for (agent, before) in paper.reviews_round_0.iter() {
                if let Some(after) = paper.reviews_round_1.get(agent) {
                    if after.score != before.score {
                        changes.push(ScoreChange {
                            paper_id: paper.paper_id.clone(),
                            agent: agent.to_string(),
                            score_0: before.score,
                            score_1: after.score,
                        });
                    }
                }
            }
        }

        let (mean_score_0, mean_variance_0, fallbacks_0) =
            round_stats(batch, |p| &p.reviews_round_0);
        let (mean_score_1, mean_variance_1, fallbacks_1) =
            round_stats(batch, |p| &p.reviews_round_1);

        DebateSummary {
            papers: batch.len(),
            mean_score_0,
            mean_score_1,
            mean_variance_0,
            mean_variance_1,
            fallbacks_0,
            fallbacks_1,
            changes,
        }
    }
}

/// `(mean score, mean variance, fallback count)` for one round.
fn round_stats(
    batch: &[PaperResult],
    pick: impl Fn(&PaperResult) -> &ReviewSet,
) -> (f64, f64, usize) {
    let means: Vec<f64> = batch.iter().map(|p| mean(&pick(p).scores())).collect();
    let variances: Vec<f64> = batch.iter().map(|p| variance(&pick(p).scores())).collect();
    let fallbacks = batch
        .iter()
        .flat_map(|p| pick(p).iter())
        .filter(|(_, r)| r.is_fallback())
        .count();
    (mean_f64(&means), mean_f64(&variances), fallbacks)
}

fn flatten_paper(paper: &PaperResult) -> FlatRow {
    let mut row = FlatRow::default();
    row.push("paper_id", Cell::Text(paper.paper_id.clone()));
    row.push("gt_decision", Cell::Text(paper.ground_truth_decision.clone()));
    row.push(
        "gt_score",
        paper.ground_truth_score.map_or(Cell::Empty, Cell::Number),
    );
    push_round(&mut row, 0, &paper.reviews_round_0);
    push_round(&mut row, 1, &paper.reviews_round_1);
    row
}

fn push_round(row: &mut FlatRow, round: u8, reviews: &ReviewSet) {
    for (agent, review) in reviews.iter() {
        row.push(format!("score_{round}_{agent}"), Cell::Score(review.score));
    }
    row.push(format!("avg_score_{round}"), Cell::Number(mean(&reviews.scores())));
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(scores: &[u8]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().map(|&s| f64::from(s)).sum::<f64>() / scores.len() as f64
}

/// Population variance; 0 for an empty slice.
pub fn variance(scores: &[u8]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let m = mean(scores);
    scores
        .iter()
        .map(|&s| (f64::from(s) - m).powi(2))
        .sum::<f64>()
        / scores.len() as f64
}

fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn push_record(out: &mut String, fields: impl Iterator<Item = String>) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(',');
        }
        first = false;
        if field.contains(|c| matches!(c, ',' | '"' | '\n' | '\r')) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(&field);
        }
    }
    out.push('\n');
}
