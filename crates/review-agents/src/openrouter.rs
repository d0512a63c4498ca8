//! OpenAI-compatible chat-completions transport (OpenRouter by default).

use std::time::Duration;

use async_trait::async_trait;
use coordination::{CompletionRequest, CompletionTransport, TransportError};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ProviderConfig;

/// HTTP transport for `{base_url}/chat/completions`.
///
/// Credentials and endpoint are passed in explicitly; one client is shared
/// by every agent on the panel.
pub struct OpenRouterTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl OpenRouterTransport {
    pub fn new(config: &ProviderConfig) -> Result<Self, TransportError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| TransportError::MissingApiKey(config.base_url.clone()))?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout: config.request_timeout(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Wire body for one request: system prompt first, then the conversation.
pub fn request_body(request: &CompletionRequest) -> Value {
    let mut messages = vec![json!({"role": "system", "content": request.system_prompt})];
    messages.extend(request.messages.iter().map(|m| json!(m)));

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "temperature": request.temperature,
    });
    if request.json_mode {
        body["response_format"] = json!({"type": "json_object"});
    }
    body
}

/// Pull `choices[0].message.content` out of a response document.
pub fn extract_content(response: &Value) -> Result<String, TransportError> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            let detail = response["error"]["message"]
                .as_str()
                .unwrap_or("missing choices[0].message.content");
            TransportError::Decode(detail.to_string())
        })
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl CompletionTransport for OpenRouterTransport {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, TransportError> {
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(self.timeout)
                } else {
                    TransportError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::RateLimited(retry_after(response.headers())));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        let content = extract_content(&json)?;

        debug!(
            model = %request.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            chars = content.len(),
            "completion received"
        );
        Ok(content)
    }
}

impl std::fmt::Debug for OpenRouterTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterTransport")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
