//! Strict-then-recovery decoding of model response bodies into [`Review`]s.
//!
//! ```text
//! body ──strict──▶ JSON object with review keys ──▶ Strict(review)
//!   │ fail
//!   └─▶ body[first '{' ..= last '}'] ──▶ same check ──▶ Recovered(review)
//!                                         │ fail
//!                                         └─▶ Failed(error)  ──▶ Review::fallback()
//! ```
//!
//! Decoding goes through a typed raw record with optional, loosely-typed
//! fields. Validation then resolves each field to its documented default:
//! unresolvable scores become [`FALLBACK_SCORE`], a missing decision becomes
//! `Reject`, missing text becomes empty.
//!
//! The required shape is a JSON object carrying at least one review key, so
//! an empty object `{}` is a parse failure rather than an empty review.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::{Decision, Review, FALLBACK_SCORE, MAX_SCORE, MIN_SCORE};

/// Keys that mark a JSON object as an attempted review.
const REVIEW_KEYS: &[&str] = &[
    "summary",
    "strengths",
    "weaknesses",
    "score",
    "decision",
    "reasoning",
    "argument",
    "arguments",
    "main_review",
];

/// Why a response body could not be decoded into a review.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("JSON object has no review fields")]
    NoReviewFields,

    #[error("no JSON object found in response")]
    NoJsonBlock,
}

/// Result of decoding one response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The whole body decoded as a review.
    Strict(Review),
    /// The review was recovered from the first `{` .. last `}` substring.
    Recovered(Review),
    /// Neither stage produced a review.
    Failed(ParseError),
}

impl ParseOutcome {
    /// Collapse to a review, substituting the fallback on failure.
    pub fn into_review(self) -> Review {
        match self {
            Self::Strict(review) | Self::Recovered(review) => review,
            Self::Failed(_) => Review::fallback(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Strict(_) => "strict",
            Self::Recovered(_) => "recovered",
            Self::Failed(_) => "failed",
        }
    }
}

/// Decode a response body using the two-stage discipline.
pub fn parse_review(body: &str) -> ParseOutcome {
    let strict_err = match decode_review(body) {
        Ok(review) => return ParseOutcome::Strict(review),
        Err(e) => e,
    };

    let Some(block) = extract_json_block(body) else {
        // Report the strict error when there was nothing to recover from.
        return match strict_err {
            ParseError::InvalidJson(_) => ParseOutcome::Failed(ParseError::NoJsonBlock),
            other => ParseOutcome::Failed(other),
        };
    };

    match decode_review(block) {
        Ok(review) => ParseOutcome::Recovered(review),
        Err(e) => ParseOutcome::Failed(e),
    }
}

/// Substring from the first `{` to the last `}` inclusive, if well ordered.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

fn decode_review(text: &str) -> Result<Review, ParseError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let object = match &value {
        Value::Object(map) => map,
        Value::Array(_) => return Err(ParseError::NotAnObject("array")),
        Value::String(_) => return Err(ParseError::NotAnObject("string")),
        Value::Number(_) => return Err(ParseError::NotAnObject("number")),
        Value::Bool(_) => return Err(ParseError::NotAnObject("bool")),
        Value::Null => return Err(ParseError::NotAnObject("null")),
    };

    if !REVIEW_KEYS.iter().any(|k| object.contains_key(*k)) {
        return Err(ParseError::NoReviewFields);
    }

    let raw: RawReview =
        serde_json::from_value(value).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    Ok(raw.validate())
}

// ---------------------------------------------------------------------------
// Raw record
// ---------------------------------------------------------------------------

/// Review as emitted by a model: every field optional and loosely typed.
#[derive(Debug, Default, Deserialize)]
struct RawReview {
    #[serde(default)]
    summary: Option<TextField>,
    #[serde(default)]
    strengths: Option<ListField>,
    #[serde(default)]
    weaknesses: Option<ListField>,
    #[serde(default)]
    score: Option<ScoreField>,
    #[serde(default)]
    decision: Option<TextField>,
    #[serde(default)]
    reasoning: Option<TextField>,
    #[serde(default)]
    argument: Option<TextField>,
    #[serde(default)]
    arguments: Option<TextField>,
    #[serde(default)]
    main_review: Option<TextField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoreField {
    Int(i64),
    Float(f64),
    Text(String),
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextField {
    Text(String),
    List(Vec<Value>),
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListField {
    List(Vec<Value>),
    Text(String),
    Other(Value),
}

impl RawReview {
    fn validate(self) -> Review {
        let reasoning = self
            .reasoning
            .or(self.argument)
            .or(self.arguments)
            .or(self.main_review)
            .map(TextField::into_text)
            .unwrap_or_default();

        Review {
            summary: self.summary.map(TextField::into_text).unwrap_or_default(),
            strengths: self.strengths.map(ListField::into_list).unwrap_or_default(),
            weaknesses: self.weaknesses.map(ListField::into_list).unwrap_or_default(),
            score: self
                .score
                .and_then(ScoreField::resolve)
                .unwrap_or(FALLBACK_SCORE),
            decision: self
                .decision
                .map(|d| resolve_decision(&d.into_text()))
                .unwrap_or(Decision::Reject),
            reasoning,
        }
    }
}

impl ScoreField {
    fn resolve(self) -> Option<u8> {
        let candidate = match self {
            Self::Int(i) => i,
            Self::Float(f) => round_float(f)?,
            Self::Text(s) => parse_score_text(&s)?,
            Self::Other(_) => return None,
        };
        in_range(candidate)
    }
}

impl TextField {
    fn into_text(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::List(items) => items
                .into_iter()
                .map(value_to_text)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            Self::Other(v) => value_to_text(v),
        }
    }
}

impl ListField {
    fn into_list(self) -> Vec<String> {
        match self {
            Self::List(items) => items
                .into_iter()
                .map(value_to_text)
                .filter(|s| !s.is_empty())
                .collect(),
            Self::Text(s) if s.trim().is_empty() => Vec::new(),
            Self::Text(s) => vec![s],
            Self::Other(_) => Vec::new(),
        }
    }
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn round_float(f: f64) -> Option<i64> {
    if f.is_finite() {
        Some(f.round() as i64)
    } else {
        None
    }
}

fn in_range(score: i64) -> Option<u8> {
    if (MIN_SCORE as i64..=MAX_SCORE as i64).contains(&score) {
        Some(score as u8)
    } else {
        None
    }
}

/// Accepts `"7"`, `" 7.4 "`, `"7/10"`, `"7 (Accept)"`.
fn parse_score_text(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if let Ok(f) = trimmed.parse::<f64>() {
        return round_float(f);
    }
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn resolve_decision(text: &str) -> Decision {
    let lower = text.to_lowercase();
    if lower.contains("reject") {
        Decision::Reject
    } else if lower.contains("accept") {
        Decision::Accept
    } else {
        Decision::Reject
    }
}
