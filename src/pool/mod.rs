//! Worker pool: lifecycle and round-robin selection.
//!
//! The pool is the sole owner of worker handles. Startup is all-or-nothing:
//! if any backend instance fails to initialize, every previously started
//! instance is torn down before the error propagates, so a partially-live
//! pool can never be observed. Selection skips workers that are not READY
//! and advances a shared cursor under a short critical section.

pub mod worker;

pub use worker::{default_profiles, QuantProfile, WorkerConfig, WorkerHandle, WorkerStatus};

use crate::backend::WorkerBackend;
use crate::errors::{PoolError, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

struct PoolState {
    workers: Vec<WorkerHandle>,
    cursor: usize,
}

/// A worker chosen for one dispatch. Carries owned data only; the handle
/// itself never leaves the pool.
#[derive(Debug, Clone)]
pub struct Selection {
    pub index: usize,
    pub endpoint: String,
    pub config: WorkerConfig,
}

pub struct WorkerPool {
    backend: Arc<dyn WorkerBackend>,
    configs: Vec<WorkerConfig>,
    state: Mutex<PoolState>,
}

impl WorkerPool {
    pub fn new(configs: Vec<WorkerConfig>, backend: Arc<dyn WorkerBackend>) -> Self {
        Self {
            backend,
            configs,
            state: Mutex::new(PoolState {
                workers: Vec::new(),
                cursor: 0,
            }),
        }
    }

    /// Number of configured workers (started or not).
    pub fn worker_count(&self) -> usize {
        self.configs.len()
    }

    pub fn configs(&self) -> &[WorkerConfig] {
        &self.configs
    }

    /// Initialize one backend instance per configured worker.
    ///
    /// Instances come up sequentially. On the first failure the pool stops
    /// every handle already READY or STARTING and returns `ResourceInit`;
    /// nothing stays running on any failure path.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.lock();
            if state.workers.iter().any(|w| {
                matches!(w.status, WorkerStatus::Starting | WorkerStatus::Ready)
            }) {
                return Err(PoolError::Config("pool is already started".to_string()));
            }
            state.workers.clear();
            state.cursor = 0;
        }

        for (idx, config) in self.configs.iter().enumerate() {
            {
                let mut state = self.lock();
                state.workers.push(WorkerHandle::new(config.clone()));
            }

            info!(
                worker = config.id,
                model = %config.model_tag,
                accelerator = config.accelerator_id,
                "Starting worker {}/{}",
                idx + 1,
                self.configs.len()
            );

            match self.backend.start(config).await {
                Ok(endpoint) => {
                    let mut state = self.lock();
                    let handle = &mut state.workers[idx];
                    handle.endpoint_url = Some(endpoint);
                    handle.status = WorkerStatus::Ready;
                }
                Err(e) => {
                    error!(worker = config.id, error = %e, "Worker failed to start, rolling back pool");
                    {
                        let mut state = self.lock();
                        state.workers[idx].status = WorkerStatus::Failed;
                    }
                    self.stop_started().await;
                    return Err(PoolError::ResourceInit {
                        worker: config.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(workers = self.configs.len(), "Worker pool started");
        Ok(())
    }

    /// Stop all handles regardless of status. Best-effort: individual stop
    /// failures are logged and skipped; every handle ends STOPPED.
    pub async fn stop(&self) {
        let targets: Vec<(usize, WorkerConfig, String)> = {
            let state = self.lock();
            state
                .workers
                .iter()
                .enumerate()
                .map(|(i, w)| (i, w.config.clone(), w.target_addr().to_string()))
                .collect()
        };

        for (idx, config, endpoint) in targets {
            if let Err(e) = self.backend.stop(&config, &endpoint).await {
                warn!(worker = config.id, error = %e, "Failed to stop worker, continuing");
            }
            let mut state = self.lock();
            state.workers[idx].status = WorkerStatus::Stopped;
        }

        info!("Worker pool stopped");
    }

    /// Stop handles that reached READY or are mid-start. Used for rollback
    /// when a later worker fails to initialize.
    async fn stop_started(&self) {
        let targets: Vec<(usize, WorkerConfig, String)> = {
            let state = self.lock();
            state
                .workers
                .iter()
                .enumerate()
                .filter(|(_, w)| {
                    matches!(w.status, WorkerStatus::Ready | WorkerStatus::Starting)
                })
                .map(|(i, w)| (i, w.config.clone(), w.target_addr().to_string()))
                .collect()
        };

        for (idx, config, endpoint) in targets {
            if let Err(e) = self.backend.stop(&config, &endpoint).await {
                warn!(worker = config.id, error = %e, "Rollback stop failed, continuing");
            }
            let mut state = self.lock();
            state.workers[idx].status = WorkerStatus::Stopped;
        }
    }

    /// Select the next READY worker, round robin.
    ///
    /// The cursor is read and advanced atomically under the pool mutex, so K
    /// consecutive successful selections across K READY workers visit each
    /// exactly once, under any number of concurrent callers.
    pub fn next_ready(&self) -> Result<Selection> {
        let mut state = self.lock();
        let n = state.workers.len();
        if n == 0 {
            return Err(PoolError::Exhausted);
        }

        for offset in 0..n {
            let idx = (state.cursor + offset) % n;
            if state.workers[idx].status == WorkerStatus::Ready {
                state.cursor = (idx + 1) % n;
                let worker = &state.workers[idx];
                debug!(worker = worker.config.id, "Selected worker");
                return Ok(Selection {
                    index: idx,
                    endpoint: worker.target_addr().to_string(),
                    config: worker.config.clone(),
                });
            }
        }

        Err(PoolError::Exhausted)
    }

    /// Number of workers currently READY.
    pub fn ready_count(&self) -> usize {
        self.lock()
            .workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Ready)
            .count()
    }

    /// Status snapshot for operator display.
    pub fn statuses(&self) -> Vec<(usize, WorkerStatus)> {
        self.lock()
            .workers
            .iter()
            .map(|w| (w.config.id, w.status))
            .collect()
    }

    /// Targets for health probing: every configured worker, whether or not
    /// the pool has been started. Unstarted workers are probed at their
    /// configured backend address.
    pub fn probe_targets(&self) -> Vec<(WorkerConfig, String)> {
        let state = self.lock();
        if state.workers.is_empty() {
            self.configs
                .iter()
                .map(|c| (c.clone(), c.backend_addr.clone()))
                .collect()
        } else {
            state
                .workers
                .iter()
                .map(|w| (w.config.clone(), w.target_addr().to_string()))
                .collect()
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn force_status(&self, idx: usize, status: WorkerStatus) {
        self.lock().workers[idx].status = status;
    }
}
