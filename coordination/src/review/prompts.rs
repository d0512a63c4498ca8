//! Prompt constants and builders for reviewer agents.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever prompt content changes so
//! result files can be traced back to the prompt that produced them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Review;

/// Prompt version. Bump on any prompt content change.
pub const PROMPT_VERSION: &str = "1.1.0";

/// Default reviewer persona.
pub const STANDARD_SYSTEM_PROMPT: &str =
    "You are an expert reviewer for ICLR, a top-tier machine learning conference.";

/// Calibrated persona that pushes scores toward the human distribution.
pub const HARSH_SYSTEM_PROMPT: &str = "\
You are a strict, critical reviewer for ICLR, a top-tier machine learning conference.
You are known for maintaining very high standards.
- You should use the full scoring range (1-10).
- The average paper should receive a 4 or 5.
- Scores of 7 or 8 should be reserved for clear acceptances.
- Scores of 9 or 10 are extremely rare.
- Be skeptical of empirical claims without rigorous proof.
";

const REVIEW_FORMAT: &str = "\
Provide your review in strict JSON format with the following keys:
- \"summary\": A brief summary of the paper.
- \"strengths\": A list of key strengths.
- \"weaknesses\": A list of key weaknesses.
- \"score\": An integer score from 1 (Strong Reject) to 10 (Strong Accept).
- \"decision\": \"Accept\" or \"Reject\".
- \"reasoning\": Your main argument for the score.";

/// Named reviewer persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    #[default]
    Standard,
    Harsh,
}

impl Persona {
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Standard => STANDARD_SYSTEM_PROMPT,
            Self::Harsh => HARSH_SYSTEM_PROMPT,
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Harsh => write!(f, "harsh"),
        }
    }
}

impl FromStr for Persona {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "harsh" => Ok(Self::Harsh),
            other => Err(format!("unknown persona '{other}' (expected standard|harsh)")),
        }
    }
}

/// Round-0 rubric prompt: novelty, significance, soundness, clarity.
pub fn review_prompt(paper_text: &str) -> String {
    format!(
        "Please review the following paper text.\n\
         Focus on novelty, significance, soundness, and clarity.\n\
         \n\
         PAPER TEXT:\n\
         {paper_text}\n\
         \n\
         {REVIEW_FORMAT}\n\
         \n\
         JSON Output:\n"
    )
}

/// Round-1 debate prompt.
///
/// `peer_reviews` must already exclude the calling agent's own review; they
/// are numbered in the order given.
pub fn update_prompt(paper_text: &str, own_previous: &Review, peer_reviews: &[Review]) -> String {
    let peers: String = peer_reviews
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "\n--- Reviewer {} ---\nScore: {}\nArgument: {}\n",
                i + 1,
                r.score,
                r.reasoning
            )
        })
        .collect();

    format!(
        "PAPER TEXT:\n\
         {paper_text}\n\
         \n\
         You previously reviewed this paper and gave it a score of {score}.\n\
         \n\
         Here are reviews from other experts:\n\
         {peers}\n\
         Please re-evaluate the paper. You should consider their arguments.\n\
         If they raise valid points you missed, adjust your score and reasoning.\n\
         If you disagree, explain why and maintain your position.\n\
         \n\
         Provide your UPDATED review in strict JSON format (same structure as before).\n\
         {REVIEW_FORMAT}\n",
        score = own_previous.score,
    )
}
