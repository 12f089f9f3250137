//! Wire types for the backend chat contract.
//!
//! Request body: `{model, messages: [{role, content}], stream: false, options}`.
//! A successful response carries a message object with a `content` string.

use serde::{Deserialize, Serialize};

/// One chat message in a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

/// Per-request model options forwarded to the backend.
///
/// The sizing fields come from the selected worker's configuration, not from
/// the caller; callers only control sampling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_batch: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_thread: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

/// Full request body sent to a worker endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerationOptions>,
}

/// Non-streaming response body from a worker endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationResponse {
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub done: bool,
    pub total_duration: Option<u64>,
    pub eval_count: Option<u32>,
}

impl GenerationResponse {
    /// Generated text, if the response carries non-empty content.
    pub fn content(&self) -> Option<&str> {
        self.message
            .as_ref()
            .map(|m| m.content.as_str())
            .filter(|c| !c.trim().is_empty())
    }
}

/// Failure modes of a single send to a worker endpoint.
///
/// Transport and status failures are terminal for the request; a body that
/// cannot be decoded is treated like an empty response and is retryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Connection-level failure (refused, reset, DNS, TLS)
    Transport(String),
    /// Backend answered with a non-success status
    Status { code: u16, body: String },
    /// Response body was not a valid generation response
    Decode(String),
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Transport(msg) => write!(f, "transport error: {}", msg),
            SendError::Status { code, body } => write!(f, "backend status {}: {}", code, body),
            SendError::Decode(msg) => write!(f, "undecodable response: {}", msg),
        }
    }
}
