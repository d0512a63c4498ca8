//! Review model: the structured evaluation an agent produces for a paper.
//!
//! A [`Review`] is immutable once returned by an agent. Scores are always
//! present: anything that cannot be resolved from a valid model response is
//! replaced by [`FALLBACK_SCORE`].
//!
//! # Submodules
//!
//! - [`parse`]: strict-then-recovery decoding of model response bodies
//! - [`prompts`]: rubric and debate prompt construction
//! - [`agent`]: the `ReviewAgent` that ties prompts, transport and parsing together

pub mod agent;
pub mod parse;
pub mod prompts;

use std::fmt;

use schemars::JsonSchema;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use agent::{AgentIdentity, ReviewAgent, DEFAULT_CALL_TIMEOUT, DEFAULT_TEMPERATURE};
pub use parse::{parse_review, ParseOutcome};
pub use prompts::Persona;

/// Sentinel score used whenever a score cannot be obtained.
pub const FALLBACK_SCORE: u8 = 5;

/// Reasoning text carried by the fallback review.
pub const FALLBACK_REASONING: &str = "Failed to generate review";

/// Lowest valid score (Strong Reject).
pub const MIN_SCORE: u8 = 1;

/// Highest valid score (Strong Accept).
pub const MAX_SCORE: u8 = 10;

/// Accept/reject recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Decision {
    Accept,
    Reject,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => write!(f, "Accept"),
            Self::Reject => write!(f, "Reject"),
        }
    }
}

/// A structured paper review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Review {
    /// Brief summary of the paper.
    pub summary: String,
    /// Key strengths, in the order the reviewer listed them.
    pub strengths: Vec<String>,
    /// Key weaknesses, in the order the reviewer listed them.
    pub weaknesses: Vec<String>,
    /// Integer score from 1 (Strong Reject) to 10 (Strong Accept).
    pub score: u8,
    /// Final recommendation.
    pub decision: Decision,
    /// Main argument for the score.
    pub reasoning: String,
}

impl Review {
    /// The low-confidence default substituted when no usable response exists.
    pub fn fallback() -> Self {
        Self {
            summary: String::new(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            score: FALLBACK_SCORE,
            decision: Decision::Reject,
            reasoning: FALLBACK_REASONING.to_string(),
        }
    }

    /// Whether this review is exactly the fallback sentinel.
    pub fn is_fallback(&self) -> bool {
        *self == Self::fallback()
    }
}

/// JSON schema of [`Review`], for downstream tooling.
pub fn review_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(Review)
}

/// Reviews keyed by agent display name, preserving insertion order.
///
/// Serialized as a JSON object whose key order is the insertion order, which
/// is the agent configuration order for every map the orchestrator builds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewSet {
    entries: Vec<(String, Review)>,
}

impl ReviewSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a review. Replaces in place if the name is already present.
    pub fn insert(&mut self, name: impl Into<String>, review: Review) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = review,
            None => self.entries.push((name, review)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Review> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
    }

    /// Display names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Review)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r))
    }

    /// Scores in insertion order.
    pub fn scores(&self) -> Vec<u8> {
        self.entries.iter().map(|(_, r)| r.score).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Review)> for ReviewSet {
    fn from_iter<I: IntoIterator<Item = (String, Review)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, review) in iter {
            set.insert(name, review);
        }
        set
    }
}

impl Serialize for ReviewSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, review) in &self.entries {
            map.serialize_entry(name, review)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ReviewSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ReviewSetVisitor;

        impl<'de> Visitor<'de> for ReviewSetVisitor {
            type Value = ReviewSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a map of agent name to review")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ReviewSet, A::Error> {
                let mut set = ReviewSet::new();
                while let Some((name, review)) = access.next_entry::<String, Review>()? {
                    set.insert(name, review);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(ReviewSetVisitor)
    }
}
