//! Single-request dispatch: admission, worker selection, deadline-raced send,
//! outcome classification.
//!
//! The admission slot is held for the whole dispatch and released on every
//! exit path, including deadline expiry and caller cancellation. The worker
//! cursor is only touched inside `next_ready`; nothing is locked across the
//! network call.

use crate::backend::types::GenerationRequest;
use crate::backend::{SendError, WorkerBackend};
use crate::dispatch::gate::ConcurrencyGate;
use crate::dispatch::outcome::{FatalReason, Outcome, RequestEnvelope, RetryReason};
use crate::errors::Result;
use crate::pool::{Selection, WorkerPool};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub struct Dispatcher {
    pool: Arc<WorkerPool>,
    gate: Arc<ConcurrencyGate>,
    backend: Arc<dyn WorkerBackend>,
}

impl Dispatcher {
    pub fn new(
        pool: Arc<WorkerPool>,
        gate: Arc<ConcurrencyGate>,
        backend: Arc<dyn WorkerBackend>,
    ) -> Self {
        Self {
            pool,
            gate,
            backend,
        }
    }

    /// Perform one request against the next READY worker.
    ///
    /// Returns `Err` only for pool-level conditions (no READY worker, gate
    /// closed); every per-request failure is expressed as an [`Outcome`].
    pub async fn dispatch(&self, envelope: &RequestEnvelope) -> Result<Outcome> {
        let _permit = self.gate.acquire().await?;
        let selection = self.pool.next_ready()?;

        let request = self.build_request(&selection, envelope);
        let started = Instant::now();

        // Racing against the deadline drops the in-flight call on expiry;
        // sibling tasks and the admission slot of other callers are untouched.
        let send = self.backend.send(&selection.endpoint, &request);
        let outcome = match tokio::time::timeout_at(envelope.deadline, send).await {
            Err(_) => {
                warn!(
                    request = %envelope.id,
                    worker = selection.config.id,
                    attempt = envelope.attempt,
                    "Request deadline expired, cancelling in-flight call"
                );
                Outcome::Retryable(RetryReason::Timeout)
            }
            Ok(Err(SendError::Transport(msg))) => {
                warn!(
                    request = %envelope.id,
                    worker = selection.config.id,
                    error = %msg,
                    "Transport failure"
                );
                Outcome::Fatal(FatalReason::Transport(msg))
            }
            Ok(Err(SendError::Status { code, body })) => {
                warn!(
                    request = %envelope.id,
                    worker = selection.config.id,
                    status = code,
                    "Backend returned failure status"
                );
                Outcome::Fatal(FatalReason::Backend {
                    status: code,
                    message: body,
                })
            }
            Ok(Err(SendError::Decode(msg))) => {
                warn!(
                    request = %envelope.id,
                    worker = selection.config.id,
                    error = %msg,
                    "Undecodable response body"
                );
                Outcome::Retryable(RetryReason::EmptyResponse)
            }
            Ok(Ok(response)) => match response.content() {
                Some(text) => {
                    let latency = started.elapsed();
                    debug!(
                        request = %envelope.id,
                        worker = selection.config.id,
                        latency_ms = latency.as_millis() as u64,
                        "Request completed"
                    );
                    Outcome::Success {
                        text: text.to_string(),
                        latency,
                    }
                }
                None => {
                    warn!(
                        request = %envelope.id,
                        worker = selection.config.id,
                        attempt = envelope.attempt,
                        "Backend returned empty content"
                    );
                    Outcome::Retryable(RetryReason::EmptyResponse)
                }
            },
        };

        Ok(outcome)
    }

    fn build_request(
        &self,
        selection: &Selection,
        envelope: &RequestEnvelope,
    ) -> GenerationRequest {
        GenerationRequest {
            model: selection.config.model_tag.clone(),
            messages: envelope.payload.messages.clone(),
            stream: false,
            options: Some(envelope.payload.options_for(
                selection.config.context_window_tokens,
                selection.config.batch_tokens,
                selection.config.thread_count,
            )),
        }
    }
}
