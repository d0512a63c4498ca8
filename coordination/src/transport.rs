//! Model-completion transport seam.
//!
//! The core never talks to a network directly. A [`CompletionTransport`]
//! turns a [`CompletionRequest`] into a raw response body, or a
//! [`TransportError`] the agent can log and route to the fallback review.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by a transport implementation.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("API request failed: {0}")]
    Request(String),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Rate limited: retry after {0:?}")]
    RateLimited(Option<Duration>),

    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    #[error("API key not configured for {0}")]
    MissingApiKey(String),

    #[error("Response decode error: {0}")]
    Decode(String),
}

impl TransportError {
    /// Whether an external client could reasonably retry this call.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Request(_) | Self::RateLimited(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::MissingApiKey(_) | Self::Decode(_) => false,
        }
    }
}

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message with role and content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One completion call: `complete(model, system, messages, temperature, json_mode)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Provider model reference, e.g. `openai/gpt-4o`.
    pub model: String,
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// Ask the provider for a JSON-formatted body.
    pub json_mode: bool,
}

impl CompletionRequest {
    /// Text of the last user message, if any.
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Trait for anything that can serve chat completions.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Execute one completion and return the raw response body.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(TransportError::Request("reset".into()).is_retriable());
        assert!(TransportError::RateLimited(None).is_retriable());
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_retriable());
        assert!(TransportError::Status {
            status: 503,
            body: String::new()
        }
        .is_retriable());
        assert!(!TransportError::Status {
            status: 401,
            body: String::new()
        }
        .is_retriable());
        assert!(!TransportError::MissingApiKey("openrouter".into()).is_retriable());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }

    #[test]
    fn test_last_user_content() {
        let request = CompletionRequest {
            model: "m".into(),
            system_prompt: "sys".into(),
            messages: vec![
                ChatMessage::user("first"),
                ChatMessage {
                    role: Role::Assistant,
                    content: "reply".into(),
                },
                ChatMessage::user("second"),
            ],
            temperature: 0.7,
            json_mode: true,
        };
        assert_eq!(request.last_user_content(), Some("second"));
    }
}
