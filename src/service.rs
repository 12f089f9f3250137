//! Generation service: the single entry point the surrounding pipeline
//! consumes.
//!
//! Wires planner output, pool, gate, dispatcher, retry controller, batch
//! coordinator, and health probe together. Everything is explicitly
//! constructed here and shared by `Arc`; there is no process-wide state.

use crate::backend::WorkerBackend;
use crate::config::DispatchConfig;
use crate::dispatch::{
    BatchCoordinator, ConcurrencyGate, Dispatcher, GenerationPayload, Outcome, RequestEnvelope,
    RetryController,
};
use crate::errors::Result;
use crate::pool::{WorkerConfig, WorkerPool};
use crate::probe::{HealthProbe, HealthReport};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct GenerationService {
    pool: Arc<WorkerPool>,
    gate: Arc<ConcurrencyGate>,
    retry: Arc<RetryController>,
    batch: BatchCoordinator,
    probe: HealthProbe,
    request_timeout: Duration,
}

impl GenerationService {
    /// Build the full dispatch stack over the given worker configurations.
    pub fn new(
        configs: Vec<WorkerConfig>,
        backend: Arc<dyn WorkerBackend>,
        config: &DispatchConfig,
    ) -> Result<Self> {
        config.validate()?;

        let gate_capacity = if config.gate_capacity.is_some() {
            config.effective_gate_capacity()
        } else {
            configs.len().max(1)
        };

        let pool = Arc::new(WorkerPool::new(configs, backend.clone()));
        let gate = Arc::new(ConcurrencyGate::new(gate_capacity));
        let dispatcher = Arc::new(Dispatcher::new(pool.clone(), gate.clone(), backend.clone()));
        let retry = Arc::new(RetryController::new(dispatcher, config.retry_policy()));
        let batch = BatchCoordinator::new(retry.clone());
        let probe = HealthProbe::new(
            pool.clone(),
            gate.clone(),
            backend,
            config.probe_config(),
        );

        info!(
            workers = pool.worker_count(),
            gate_capacity = gate_capacity,
            "Generation service constructed"
        );

        Ok(Self {
            pool,
            gate,
            retry,
            batch,
            probe,
            request_timeout: config.request_timeout(),
        })
    }

    /// Start all pool workers (all-or-nothing).
    pub async fn start(&self) -> Result<()> {
        self.pool.start().await
    }

    /// Stop all pool workers (best-effort).
    pub async fn stop(&self) {
        self.pool.stop().await;
    }

    /// Submit one payload with the configured per-request deadline.
    pub async fn submit(&self, payload: GenerationPayload) -> Result<Outcome> {
        self.submit_with_timeout(payload, self.request_timeout).await
    }

    /// Submit one payload with an explicit per-attempt deadline.
    pub async fn submit_with_timeout(
        &self,
        payload: GenerationPayload,
        timeout: Duration,
    ) -> Result<Outcome> {
        self.retry
            .call(move |attempt| RequestEnvelope::new(payload.clone(), timeout, attempt))
            .await
    }

    /// Submit many payloads; one result per input, in input order.
    pub async fn submit_batch(
        &self,
        payloads: Vec<GenerationPayload>,
    ) -> Vec<Result<Outcome>> {
        self.batch.submit_batch(payloads, self.request_timeout).await
    }

    /// Probe every configured worker and aggregate latency/status.
    pub async fn probe_all(&self) -> HealthReport {
        self.probe.probe_all().await
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }
}
