//! Worker configuration and runtime handle types.
//!
//! A worker is one logical backend instance capable of serving one generation
//! request at a time. Several workers may share a single accelerator; the
//! planner decides how many fit and under which quantization profile.

use serde::{Deserialize, Serialize};

/// A named quantization profile: a memory/throughput tradeoff applied to a
/// worker's model variant.
///
/// The weight is the approximate fraction of the full-precision model size
/// that this variant occupies in accelerator memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantProfile {
    /// Model tag suffix, e.g. "q4_k_m"
    pub tag: String,
    /// Approximate memory fraction relative to the unquantized model
    pub memory_weight: f64,
}

impl QuantProfile {
    pub fn new(tag: &str, memory_weight: f64) -> Self {
        Self {
            tag: tag.to_string(),
            memory_weight,
        }
    }
}

/// The built-in profile cycle assigned round-robin across planned workers.
pub fn default_profiles() -> Vec<QuantProfile> {
    vec![
        QuantProfile::new("q4_k_m", 0.25),
        QuantProfile::new("q4_0", 0.23),
        QuantProfile::new("q4_1", 0.24),
    ]
}

/// Static configuration for one backend worker instance.
///
/// Computed once by the planner at pool construction and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker index within the pool (also used as its public identifier)
    pub id: usize,

    /// Base address of the backend serving this worker, e.g. "http://127.0.0.1:11434"
    pub backend_addr: String,

    /// Accelerator this worker is pinned to
    pub accelerator_id: u32,

    /// Context window in tokens, derived from the worker's memory budget
    pub context_window_tokens: u32,

    /// Batch size in tokens
    pub batch_tokens: u32,

    /// CPU threads allotted to this worker
    pub thread_count: u32,

    /// Quantization profile applied to this worker's model variant
    pub profile: QuantProfile,

    /// Fully qualified model tag, e.g. "yi:6b-q4_k_m"
    pub model_tag: String,
}

/// Lifecycle state of a pool worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Backend initialization in progress
    Starting,
    /// Backend initialized and accepting requests
    Ready,
    /// Backend initialization or runtime failure
    Failed,
    /// Worker shut down
    Stopped,
}

/// Runtime handle for one worker. Owned exclusively by the pool; every other
/// component addresses workers by index.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub config: WorkerConfig,
    /// Resolved endpoint URL, assigned once the backend reports ready
    pub endpoint_url: Option<String>,
    pub status: WorkerStatus,
}

impl WorkerHandle {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            endpoint_url: None,
            status: WorkerStatus::Starting,
        }
    }

    /// The address a request for this worker should be sent to.
    ///
    /// Falls back to the configured backend address when the worker has not
    /// been started (health probes do not require a started pool).
    pub fn target_addr(&self) -> &str {
        self.endpoint_url.as_deref().unwrap_or(&self.config.backend_addr)
    }
}
