//! Scripted in-memory backend.
//!
//! Used by the test suite and by the CLI dry-run path to exercise the
//! dispatch machinery without a live endpoint. Replies are consumed from a
//! script queue in order; an exhausted script answers with a canned success.

use crate::backend::types::{ChatMessage, GenerationRequest, GenerationResponse, SendError};
use crate::backend::WorkerBackend;
use crate::errors::{PoolError, Result};
use crate::pool::WorkerConfig;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted answer from the mock backend.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Respond with the given text
    Text(String),
    /// Respond with whitespace-only content
    Empty,
    /// Sleep for the given duration, then respond with the given text
    Stall(Duration, String),
    /// Fail at the transport level
    Transport(String),
    /// Respond with a non-success HTTP status
    Status(u16),
}

#[derive(Default)]
struct MockState {
    script: VecDeque<ScriptedReply>,
    sends_per_endpoint: HashMap<String, u64>,
    started: Vec<usize>,
    stopped: Vec<usize>,
}

/// In-memory [`WorkerBackend`] with scripted replies and call accounting.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    fail_start_for: Mutex<Vec<usize>>,
    total_sends: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Decrements the in-flight counter even when the send future is cancelled.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reply to the script queue.
    pub fn push_reply(&self, reply: ScriptedReply) {
        self.lock_state().script.push_back(reply);
    }

    /// Make `start` fail for the given worker id.
    pub fn fail_start_for(&self, worker_id: usize) {
        self.fail_start_for
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(worker_id);
    }

    /// Total number of send calls observed.
    pub fn total_sends(&self) -> usize {
        self.total_sends.load(Ordering::SeqCst)
    }

    /// Number of send calls observed per endpoint.
    pub fn sends_for(&self, endpoint: &str) -> u64 {
        self.lock_state()
            .sends_per_endpoint
            .get(endpoint)
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of concurrently in-flight sends observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Worker ids whose backend instances were started, in order.
    pub fn started(&self) -> Vec<usize> {
        self.lock_state().started.clone()
    }

    /// Worker ids whose backend instances were stopped, in order.
    pub fn stopped(&self) -> Vec<usize> {
        self.lock_state().stopped.clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn text_response(text: String) -> GenerationResponse {
        GenerationResponse {
            message: Some(ChatMessage {
                role: "assistant".to_string(),
                content: text,
            }),
            done: true,
            total_duration: None,
            eval_count: None,
        }
    }
}

#[async_trait]
impl WorkerBackend for MockBackend {
    async fn start(&self, config: &WorkerConfig) -> Result<String> {
        let should_fail = self
            .fail_start_for
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&config.id);

        if should_fail {
            return Err(PoolError::Http(format!(
                "simulated start failure for worker {}",
                config.id
            )));
        }

        self.lock_state().started.push(config.id);
        Ok(format!("mock://worker-{}", config.id))
    }

    async fn stop(&self, config: &WorkerConfig, _endpoint: &str) -> Result<()> {
        self.lock_state().stopped.push(config.id);
        Ok(())
    }

    async fn send(
        &self,
        endpoint: &str,
        _request: &GenerationRequest,
    ) -> std::result::Result<GenerationResponse, SendError> {
        self.total_sends.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let reply = {
            let mut state = self.lock_state();
            *state
                .sends_per_endpoint
                .entry(endpoint.to_string())
                .or_insert(0) += 1;
            state.script.pop_front()
        };

        match reply {
            None => Ok(Self::text_response("ok".to_string())),
            Some(ScriptedReply::Text(text)) => Ok(Self::text_response(text)),
            Some(ScriptedReply::Empty) => Ok(Self::text_response("   ".to_string())),
            Some(ScriptedReply::Stall(duration, text)) => {
                tokio::time::sleep(duration).await;
                Ok(Self::text_response(text))
            }
            Some(ScriptedReply::Transport(msg)) => Err(SendError::Transport(msg)),
            Some(ScriptedReply::Status(code)) => Err(SendError::Status {
                code,
                body: "scripted failure".to_string(),
            }),
        }
    }
}
