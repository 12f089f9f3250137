//! Capacity planning: turn an accelerator/CPU snapshot into per-worker
//! configurations.
//!
//! The planner never provisions hardware; it only computes how many logical
//! workers a given memory budget can host and how large each one may be.
//! Quantization profiles are assigned cyclically so a pool mixes variants,
//! and workers are spread across accelerators the same way.

use crate::errors::{PoolError, Result};
use crate::pool::worker::{default_profiles, WorkerConfig};
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Rough bytes of accelerator memory consumed per context token.
const BYTES_PER_TOKEN_ESTIMATE: u64 = 6;

/// Hard cap on any worker's context window.
const CONTEXT_WINDOW_CAP: u32 = 8192;

/// Batch size applied uniformly to planned workers.
const DEFAULT_BATCH_TOKENS: u32 = 512;

/// A snapshot of the capacity available for hosting workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Total accelerator memory in bytes across all accelerators
    pub total_accelerator_memory: u64,
    /// Number of accelerators available
    pub accelerator_count: u32,
    /// CPU cores available for worker threads
    pub cpu_cores: u32,
}

impl ResourceSnapshot {
    /// Build a snapshot from the local machine.
    ///
    /// CPU cores are detected; accelerator memory and count cannot be seen
    /// from here and must be supplied by the caller's configuration.
    pub fn detect(total_accelerator_memory: u64, accelerator_count: u32) -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        let cpu_cores = sys.cpus().len().max(1) as u32;

        Self {
            total_accelerator_memory,
            accelerator_count,
            cpu_cores,
        }
    }
}

/// Plan `desired` worker configurations against the given snapshot.
///
/// Each worker gets an equal share of accelerator memory. Its context window
/// is derived from that share and its profile's memory weight, capped at
/// [`CONTEXT_WINDOW_CAP`] and additionally clamped so that
/// `batch_tokens * context_window_tokens` never exceeds the worker's share.
pub fn plan_workers(
    snapshot: &ResourceSnapshot,
    desired: u32,
    model: &str,
    base_port: u16,
) -> Result<Vec<WorkerConfig>> {
    if snapshot.accelerator_count == 0 {
        return Err(PoolError::Planning(
            "accelerator count is zero".to_string(),
        ));
    }
    if desired < 1 {
        return Err(PoolError::Planning(
            "desired worker count must be at least 1".to_string(),
        ));
    }

    let memory_per_worker = snapshot.total_accelerator_memory / desired as u64;
    let thread_count = (snapshot.cpu_cores / desired).max(1);
    let profiles = default_profiles();

    let mut configs = Vec::with_capacity(desired as usize);
    for i in 0..desired {
        let profile = &profiles[i as usize % profiles.len()];

        let derived = (memory_per_worker as f64 * profile.memory_weight
            / BYTES_PER_TOKEN_ESTIMATE as f64) as u64;
        let mut context_window = derived.min(CONTEXT_WINDOW_CAP as u64) as u32;

        // batch x context must fit the worker's memory share
        let budget_cap = memory_per_worker / DEFAULT_BATCH_TOKENS as u64;
        if (context_window as u64) > budget_cap {
            context_window = budget_cap as u32;
        }

        if context_window == 0 {
            return Err(PoolError::Planning(format!(
                "memory budget too small: {} bytes per worker cannot host a context window",
                memory_per_worker
            )));
        }

        configs.push(WorkerConfig {
            id: i as usize,
            backend_addr: format!("http://127.0.0.1:{}", base_port as u32 + i),
            accelerator_id: i % snapshot.accelerator_count,
            context_window_tokens: context_window,
            batch_tokens: DEFAULT_BATCH_TOKENS,
            thread_count,
            profile: profile.clone(),
            model_tag: format!("{}-{}", model, profile.tag),
        });
    }

    Ok(configs)
}

/// Parse a memory string like "24GB", "512MB", or raw bytes.
///
/// Decimal (SI) units; binary suffixes (GiB, MiB) are also accepted.
pub fn parse_memory_string(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();

    let parse_scaled = |digits: &str, scale: f64| -> Result<u64> {
        let value: f64 = digits
            .trim()
            .parse()
            .map_err(|_| PoolError::Config(format!("Invalid memory format: {}", s)))?;
        Ok((value * scale) as u64)
    };

    if let Some(v) = s.strip_suffix("GIB") {
        return parse_scaled(v, 1_073_741_824.0);
    }
    if let Some(v) = s.strip_suffix("MIB") {
        return parse_scaled(v, 1_048_576.0);
    }
    if let Some(v) = s.strip_suffix("GB") {
        return parse_scaled(v, 1_000_000_000.0);
    }
    if let Some(v) = s.strip_suffix("MB") {
        return parse_scaled(v, 1_000_000.0);
    }

    s.parse::<u64>().map_err(|_| {
        PoolError::Config(format!(
            "Invalid memory format: {}. Use '24GB', '512MB', or bytes",
            s
        ))
    })
}
