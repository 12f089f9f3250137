//! Dispatch configuration, persisted as TOML.

use crate::dispatch::retry::RetryPolicy;
use crate::errors::{PoolError, Result};
use crate::probe::ProbeConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Configuration for the dispatch pool, supplied by the surrounding
/// pipeline or loaded from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Base model name; the planner appends the quantization tag
    pub model: String,

    /// Desired number of logical workers
    pub worker_count: u32,

    /// First backend port; worker i listens at base_port + i
    pub base_port: u16,

    /// Accelerator memory budget in bytes, across all accelerators
    pub accelerator_memory: u64,

    /// Number of accelerators
    pub accelerator_count: u32,

    /// Admission gate capacity; defaults to the worker count when absent
    pub gate_capacity: Option<usize>,

    /// Total dispatch attempts per request, including the first
    pub max_attempts: u32,

    /// Jittered backoff window between retries, milliseconds
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,

    /// Per-request deadline, seconds
    pub request_timeout_secs: u64,

    /// Health probe deadline, seconds
    pub probe_timeout_secs: u64,

    /// Fold timed-out probes into the latency average at the deadline value
    pub count_timeouts_in_average: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            model: "yi:6b".to_string(),
            worker_count: 4,
            base_port: 11434,
            accelerator_memory: 24_000_000_000,
            accelerator_count: 1,
            gate_capacity: None,
            max_attempts: 5,
            backoff_min_ms: 1000,
            backoff_max_ms: 3000,
            request_timeout_secs: 30,
            probe_timeout_secs: 30,
            count_timeouts_in_average: false,
        }
    }
}

impl DispatchConfig {
    /// Default config file location: ~/.inferpool/dispatch.toml
    pub fn default_path() -> Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| PoolError::Config("Home directory not found".into()))?
            .join(".inferpool")
            .join("dispatch.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count < 1 {
            return Err(PoolError::Config("worker_count must be at least 1".into()));
        }
        if self.max_attempts < 1 {
            return Err(PoolError::Config("max_attempts must be at least 1".into()));
        }
        if self.backoff_min_ms > self.backoff_max_ms {
            return Err(PoolError::Config(
                "backoff_min_ms must not exceed backoff_max_ms".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(PoolError::Config("request_timeout_secs must be non-zero".into()));
        }
        if let Some(0) = self.gate_capacity {
            return Err(PoolError::Config("gate_capacity must be non-zero".into()));
        }
        Ok(())
    }

    /// Effective admission gate capacity.
    pub fn effective_gate_capacity(&self) -> usize {
        self.gate_capacity.unwrap_or(self.worker_count as usize)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_min: Duration::from_millis(self.backoff_min_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
        }
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            deadline: Duration::from_secs(self.probe_timeout_secs),
            count_timeouts_in_average: self.count_timeouts_in_average,
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let toml_str = std::fs::read_to_string(path)?;
        let config: DispatchConfig = toml::from_str(&toml_str)
            .map_err(|e| PoolError::Config(format!("Invalid config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to disk using an atomic write.
    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_str = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, toml_str)?;
        std::fs::rename(&temp_path, path)?;

        info!(path = %path.display(), "Saved dispatch config");
        Ok(())
    }
}
