//! Reviewer agent: one language-model identity on the panel.
//!
//! Owns prompt construction and response parsing. Every failure mode
//! (transport error, timeout, unparseable body) collapses into
//! [`Review::fallback`]; callers never see an error from `review` or
//! `update_review`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::parse::{parse_review, ParseOutcome};
use super::prompts::{self, Persona};
use super::Review;
use crate::transport::{ChatMessage, CompletionRequest, CompletionTransport, TransportError};

/// Sampling temperature: room for argumentative variety while staying JSON-compliant.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Upper bound on a single model call before it is treated as a transport failure.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(180);

/// Characters of a failed body kept in the log line.
const LOG_PREVIEW_CHARS: usize = 100;

/// Immutable identity of one reviewer for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Provider model reference, e.g. `anthropic/claude-3.5-sonnet`.
    pub model: String,
    /// Display name; unique within a run and used as the result key.
    pub name: String,
    /// Persona / system instruction.
    pub system_prompt: String,
}

impl AgentIdentity {
    /// Identity with the standard reviewer persona.
    pub fn new(model: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            name: name.into(),
            system_prompt: Persona::Standard.system_prompt().to_string(),
        }
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.system_prompt = persona.system_prompt().to_string();
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }
}

/// A reviewer backed by one model through a shared transport.
#[derive(Clone)]
pub struct ReviewAgent {
    identity: AgentIdentity,
    transport: Arc<dyn CompletionTransport>,
    temperature: f32,
    call_timeout: Duration,
}

impl ReviewAgent {
    pub fn new(identity: AgentIdentity, transport: Arc<dyn CompletionTransport>) -> Self {
        Self {
            identity,
            transport,
            temperature: DEFAULT_TEMPERATURE,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Round 0: independent rubric review.
    pub async fn review(&self, paper_text: &str) -> Review {
        self.run(prompts::review_prompt(paper_text), 0).await
    }

    /// Round 1: reconsider after seeing peer reviews.
    ///
    /// `peer_reviews` must not contain this agent's own review.
    pub async fn update_review(
        &self,
        paper_text: &str,
        own_previous: &Review,
        peer_reviews: &[Review],
    ) -> Review {
        self.run(
            prompts::update_prompt(paper_text, own_previous, peer_reviews),
            1,
        )
        .await
    }

    async fn run(&self, prompt: String, round: u8) -> Review {
        let body = match self.call(prompt).await {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    agent = %self.identity.name,
                    model = %self.identity.model,
                    round,
                    retriable = e.is_retriable(),
                    error = %e,
                    "API error, using fallback review"
                );
                return Review::fallback();
            }
        };

        let outcome = parse_review(&body);
        match &outcome {
            ParseOutcome::Strict(review) => {
                debug!(agent = %self.identity.name, round, score = review.score, "review parsed");
            }
            ParseOutcome::Recovered(review) => {
                info!(
                    agent = %self.identity.name,
                    round,
                    score = review.score,
                    "review recovered from wrapped response"
                );
            }
            ParseOutcome::Failed(err) => {
                let preview: String = body.chars().take(LOG_PREVIEW_CHARS).collect();
                warn!(
                    agent = %self.identity.name,
                    round,
                    error = %err,
                    response = %preview,
                    "JSON parse error, using fallback review"
                );
            }
        }
        outcome.into_review()
    }

    async fn call(&self, prompt: String) -> Result<String, TransportError> {
        let request = CompletionRequest {
            model: self.identity.model.clone(),
            system_prompt: self.identity.system_prompt.clone(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: self.temperature,
            json_mode: true,
        };

        match tokio::time::timeout(self.call_timeout, self.transport.complete(&request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.call_timeout)),
        }
    }
}

impl std::fmt::Debug for ReviewAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewAgent")
            .field("identity", &self.identity)
            .field("temperature", &self.temperature)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}
