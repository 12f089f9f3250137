//! Per-request envelope and outcome types.

use crate::backend::types::{ChatMessage, GenerationOptions};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Caller-supplied content of one generation request. Sizing options come
/// from the selected worker, not from here.
#[derive(Debug, Clone)]
pub struct GenerationPayload {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerationPayload {
    pub fn from_prompt(prompt: &str) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
            temperature: None,
            max_tokens: None,
        }
    }

    /// Options block for a request, merged with worker sizing.
    pub fn options_for(
        &self,
        num_ctx: u32,
        num_batch: u32,
        num_thread: u32,
    ) -> GenerationOptions {
        GenerationOptions {
            num_ctx: Some(num_ctx),
            num_batch: Some(num_batch),
            num_thread: Some(num_thread),
            temperature: self.temperature,
            num_predict: self.max_tokens,
        }
    }
}

/// One dispatch attempt: payload, absolute deadline, attempt counter.
/// Created per call and discarded once an outcome is resolved.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub id: Uuid,
    pub payload: GenerationPayload,
    pub deadline: Instant,
    pub attempt: u32,
}

impl RequestEnvelope {
    pub fn new(payload: GenerationPayload, timeout: Duration, attempt: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            deadline: Instant::now() + timeout,
            attempt,
        }
    }
}

/// Why a request failed in a way worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// Deadline expired before the backend answered
    Timeout,
    /// Backend answered with empty or undecodable content
    EmptyResponse,
}

impl std::fmt::Display for RetryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryReason::Timeout => write!(f, "timeout"),
            RetryReason::EmptyResponse => write!(f, "empty response"),
        }
    }
}

/// Why a request failed terminally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalReason {
    /// Connection-level failure reaching the backend
    Transport(String),
    /// Backend answered with a non-success status
    Backend { status: u16, message: String },
    /// Retry budget spent; carries the last retryable reason
    RetriesExhausted(RetryReason),
}

impl std::fmt::Display for FatalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FatalReason::Transport(msg) => write!(f, "transport error: {}", msg),
            FatalReason::Backend { status, message } => {
                write!(f, "backend status {}: {}", status, message)
            }
            FatalReason::RetriesExhausted(reason) => {
                write!(f, "retries exhausted ({})", reason)
            }
        }
    }
}

/// Resolved result of one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success { text: String, latency: Duration },
    Retryable(RetryReason),
    Fatal(FatalReason),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// Generated text, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Outcome::Success { text, .. } => Some(text),
            _ => None,
        }
    }
}
