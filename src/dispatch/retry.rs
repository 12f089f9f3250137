//! Bounded retries with jittered backoff around the dispatcher.
//!
//! Only retryable outcomes (timeout, empty response) are retried; a fatal
//! outcome short-circuits immediately. Backoff durations are sampled
//! uniformly from the configured range so that concurrent retries do not
//! synchronize against the same backend.

use crate::dispatch::dispatcher::Dispatcher;
use crate::dispatch::outcome::{FatalReason, Outcome, RequestEnvelope};
use crate::errors::Result;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy: attempt budget and backoff window.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total dispatch attempts, including the first
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_min: Duration::from_millis(1000),
            backoff_max: Duration::from_millis(3000),
        }
    }
}

impl RetryPolicy {
    /// Sample a jittered wait from the backoff window.
    fn jitter(&self) -> Duration {
        let min = self.backoff_min.as_millis() as u64;
        let max = self.backoff_max.as_millis() as u64;
        if max <= min {
            return self.backoff_min;
        }
        let ms = rand::thread_rng().gen_range(min..=max);
        Duration::from_millis(ms)
    }
}

pub struct RetryController {
    dispatcher: Arc<Dispatcher>,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(dispatcher: Arc<Dispatcher>, policy: RetryPolicy) -> Self {
        Self { dispatcher, policy }
    }

    /// Dispatch with retries. `make_envelope` is invoked once per attempt so
    /// each attempt carries a fresh deadline and the current attempt number.
    pub async fn call<F>(&self, mut make_envelope: F) -> Result<Outcome>
    where
        F: FnMut(u32) -> RequestEnvelope,
    {
        let mut last_reason = None;

        for attempt in 1..=self.policy.max_attempts {
            let envelope = make_envelope(attempt);
            let outcome = self.dispatcher.dispatch(&envelope).await?;

            match outcome {
                Outcome::Retryable(reason) => {
                    last_reason = Some(reason);
                    if attempt < self.policy.max_attempts {
                        let wait = self.policy.jitter();
                        debug!(
                            request = %envelope.id,
                            attempt = attempt,
                            reason = %reason,
                            backoff_ms = wait.as_millis() as u64,
                            "Retryable failure, backing off"
                        );
                        sleep(wait).await;
                    }
                }
                other => return Ok(other),
            }
        }

        // Attempt budget spent on consecutive retryable failures
        let reason = last_reason.unwrap_or(crate::dispatch::outcome::RetryReason::EmptyResponse);
        warn!(
            attempts = self.policy.max_attempts,
            reason = %reason,
            "Retries exhausted"
        );
        Ok(Outcome::Fatal(FatalReason::RetriesExhausted(reason)))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}
