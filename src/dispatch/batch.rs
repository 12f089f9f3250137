//! Batch fan-out with order-preserving result collection.
//!
//! Every item is dispatched concurrently; total parallelism is bounded by
//! the shared admission gate, not by batch size. Results are assembled by
//! input position, so completion order never matters, and one item's failure
//! never cancels its siblings.

use crate::dispatch::outcome::{FatalReason, GenerationPayload, Outcome, RequestEnvelope};
use crate::dispatch::retry::RetryController;
use crate::errors::Result;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct BatchCoordinator {
    retry: Arc<RetryController>,
}

impl BatchCoordinator {
    pub fn new(retry: Arc<RetryController>) -> Self {
        Self { retry }
    }

    /// Dispatch every payload concurrently and return one result per input,
    /// in input order. Each attempt of each item gets a fresh deadline of
    /// `timeout` from the moment the attempt starts.
    pub async fn submit_batch(
        &self,
        payloads: Vec<GenerationPayload>,
        timeout: Duration,
    ) -> Vec<Result<Outcome>> {
        let total = payloads.len();
        info!(items = total, "Submitting batch");

        let tasks: Vec<_> = payloads
            .into_iter()
            .enumerate()
            .map(|(index, payload)| {
                let retry = self.retry.clone();
                tokio::spawn(async move {
                    retry
                        .call(move |attempt| {
                            RequestEnvelope::new(payload.clone(), timeout, attempt)
                        })
                        .await
                })
            })
            .collect();

        let results: Vec<Result<Outcome>> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) => {
                    // A panicked or aborted task fails only its own slot
                    error!(error = %e, "Batch item task aborted");
                    Ok(Outcome::Fatal(FatalReason::Transport(format!(
                        "dispatch task aborted: {}",
                        e
                    ))))
                }
            })
            .collect();

        let succeeded = results
            .iter()
            .filter(|r| matches!(r, Ok(outcome) if outcome.is_success()))
            .count();
        info!(items = total, succeeded = succeeded, "Batch complete");

        results
    }
}
