//! Client for the upstream chat completion API.
//!
//! The client sends the whole conversation snapshot in one request and reads
//! back a single complete response. A response that parses but carries no
//! usable content yields [`Completion::Fallback`]; transport failures, non-2xx
//! statuses and unparseable bodies are reported as [`UpstreamError`].

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::config::UpstreamConfig;
use crate::context::Turn;

/// Reply used when the provider answers without any content.
pub const FALLBACK_REPLY: &str = "Sorry, I couldn't generate a response.";

/// Longest excerpt of an error body kept in [`UpstreamError::Status`].
const ERROR_BODY_LIMIT: usize = 512;

/// Outcome of a completion call that produced text to hand back to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Content generated by the model
    Reply(String),
    /// The provider answered without usable content
    Fallback(String),
}

impl Completion {
    pub fn text(&self) -> &str {
        match self {
            Completion::Reply(text) | Completion::Fallback(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Completion::Reply(text) | Completion::Fallback(text) => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Completion::Fallback(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream request failed: {0}")]
    Network(String),

    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode upstream response: {0}")]
    Decode(String),
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// Body of a chat completion request.
#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
}

/// Picks the reply out of a decoded response body.
///
/// Only the first choice is read. Anything short of a non-empty string at
/// `choices[0].message.content` becomes the fallback reply.
pub fn extract_reply(body: &Value) -> Completion {
    match body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        Some(content) if !content.is_empty() => Completion::Reply(content.to_string()),
        _ => Completion::Fallback(FALLBACK_REPLY.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl CompletionClient {
    pub fn new(config: UpstreamConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// Maps a snapshot to the provider's message list, preceded by the
    /// configured system prompt if there is one.
    pub fn build_request<'a>(&'a self, snapshot: &'a [Turn]) -> CompletionRequest<'a> {
        let mut messages = Vec::with_capacity(snapshot.len() + 1);
        if let Some(prompt) = self.config.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: prompt,
            });
        }
        messages.extend(snapshot.iter().map(|turn| ChatMessage {
            role: turn.role().as_str(),
            content: turn.content(),
        }));
        CompletionRequest {
            model: &self.config.model,
            messages,
        }
    }

    /// Sends `snapshot` upstream and waits for the complete response.
    ///
    /// `snapshot` must hold at least the user turn that triggered the call.
    pub async fn complete(&self, snapshot: &[Turn]) -> Result<Completion, UpstreamError> {
        debug_assert!(!snapshot.is_empty(), "completion requires a non-empty context");

        let request = self.build_request(snapshot);
        debug!(
            endpoint = %self.config.endpoint,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.app_title)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = truncate(&body, ERROR_BODY_LIMIT);
            error!(status = status.as_u16(), body = %body, "Upstream returned an error status");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        let body: Value = serde_json::from_slice(&bytes).map_err(|e| {
            error!("Failed to decode upstream response: {}", e);
            UpstreamError::Decode(e.to_string())
        })?;

        let completion = extract_reply(&body);
        if completion.is_fallback() {
            debug!("Upstream response carried no content, using fallback reply");
        }
        Ok(completion)
    }

    fn transport_error(&self, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            error!("Upstream request timed out after {:?}", self.config.timeout);
            UpstreamError::Timeout(self.config.timeout)
        } else {
            error!("Error communicating with upstream: {}", err);
            UpstreamError::Network(err.to_string())
        }
    }
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
