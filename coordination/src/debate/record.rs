//! Per-paper debate records.

use serde::{Deserialize, Serialize};

use crate::corpus::PaperRecord;
use crate::review::ReviewSet;

/// Both rounds of reviews for one paper.
///
/// Created empty when the paper starts, filled round by round, and not
/// modified once Round 1 has been recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperResult {
    pub paper_id: String,
    pub ground_truth_decision: String,
    pub ground_truth_score: Option<f64>,
    /// Independent reviews, keyed by agent display name in configuration order.
    pub reviews_round_0: ReviewSet,
    /// Post-debate reviews, same keys as round 0 once complete.
    pub reviews_round_1: ReviewSet,
}

/// Completed papers in input order. Papers that failed to load are absent.
pub type BatchResult = Vec<PaperResult>;

impl PaperResult {
    pub fn new(record: &PaperRecord) -> Self {
        Self {
            paper_id: record.paper_id.clone(),
            ground_truth_decision: record.ground_truth_decision.clone(),
            ground_truth_score: record.ground_truth_score,
            reviews_round_0: ReviewSet::new(),
            reviews_round_1: ReviewSet::new(),
        }
    }

    /// Whether both rounds hold exactly `agent_names`, in order.
    pub fn is_complete_for(&self, agent_names: &[&str]) -> bool {
        self.reviews_round_0.names().eq(agent_names.iter().copied())
            && self.reviews_round_1.names().eq(agent_names.iter().copied())
    }
}
