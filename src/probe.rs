//! Pool health probing.
//!
//! One lightweight generation per configured worker, each admitted through
//! the same gate as real traffic so a probe can never oversubscribe a busy
//! pool. Probing never fails: every per-worker error becomes a row in the
//! report.

use crate::backend::types::GenerationRequest;
use crate::backend::WorkerBackend;
use crate::dispatch::gate::ConcurrencyGate;
use crate::dispatch::outcome::GenerationPayload;
use crate::pool::{WorkerConfig, WorkerPool};
use chrono::{DateTime, Local};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Prompt sent as the probe payload. Kept tiny so a probe costs one short
/// generation.
const PROBE_PROMPT: &str = "Reply with a single word.";
const PROBE_MAX_TOKENS: u32 = 10;

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Fixed deadline applied to every probe call
    pub deadline: Duration,
    /// Fold timed-out probes into the latency average at the deadline value
    /// instead of excluding them
    pub count_timeouts_in_average: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(30),
            count_timeouts_in_average: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Ok,
    Timeout,
    Fail,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Ok => write!(f, "OK"),
            ProbeStatus::Timeout => write!(f, "TIMEOUT"),
            ProbeStatus::Fail => write!(f, "FAIL"),
        }
    }
}

/// Result of probing one worker.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub worker_id: usize,
    pub model_tag: String,
    /// Measured round trip; absent for timed-out and failed probes
    pub latency: Option<Duration>,
    pub status: ProbeStatus,
}

/// Aggregated health report across the pool.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub outcomes: Vec<ProbeOutcome>,
    pub probe_deadline: Duration,
    pub count_timeouts_in_average: bool,
    pub generated_at: DateTime<Local>,
}

impl HealthReport {
    pub fn ok_count(&self) -> usize {
        self.count_status(ProbeStatus::Ok)
    }

    pub fn timeout_count(&self) -> usize {
        self.count_status(ProbeStatus::Timeout)
    }

    pub fn fail_count(&self) -> usize {
        self.count_status(ProbeStatus::Fail)
    }

    fn count_status(&self, status: ProbeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Average latency over workers that returned a measured time. Timeouts
    /// and failures are excluded (and reported separately as counts), unless
    /// the timeout-penalty policy is enabled, in which case each timed-out
    /// probe contributes the probe deadline.
    pub fn average_latency(&self) -> Option<Duration> {
        let mut samples: Vec<Duration> = self
            .outcomes
            .iter()
            .filter(|o| o.status == ProbeStatus::Ok)
            .filter_map(|o| o.latency)
            .collect();

        if self.count_timeouts_in_average {
            samples.extend(
                std::iter::repeat(self.probe_deadline).take(self.timeout_count()),
            );
        }

        if samples.is_empty() {
            return None;
        }

        let total: Duration = samples.iter().sum();
        Some(total / samples.len() as u32)
    }

    /// Render the report as a table for operator display.
    pub fn display(&self) {
        use colored::Colorize;

        println!("\n{}", "Pool Health".bold().cyan());
        println!("{}", "===========".cyan());
        println!(
            "{:<8} {:<20} {:<10} {}",
            "WORKER", "MODEL", "STATUS", "TIME"
        );
        println!("{}", "-".repeat(50));

        for outcome in &self.outcomes {
            let status = match outcome.status {
                ProbeStatus::Ok => "OK".green(),
                ProbeStatus::Timeout => "TIMEOUT".yellow(),
                ProbeStatus::Fail => "FAIL".red(),
            };
            let time = outcome
                .latency
                .map(|l| format!("{:.2}s", l.as_secs_f64()))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<8} {:<20} {:<10} {}",
                outcome.worker_id, outcome.model_tag, status, time
            );
        }

        println!("{}", "-".repeat(50));
        let avg = self
            .average_latency()
            .map(|l| format!("{:.2}s", l.as_secs_f64()))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "ok: {}  timeout: {}  fail: {}  avg latency: {}",
            self.ok_count(),
            self.timeout_count(),
            self.fail_count(),
            avg
        );
        println!("generated: {}\n", self.generated_at.format("%Y-%m-%d %H:%M:%S"));
    }
}

pub struct HealthProbe {
    pool: Arc<WorkerPool>,
    gate: Arc<ConcurrencyGate>,
    backend: Arc<dyn WorkerBackend>,
    config: ProbeConfig,
}

impl HealthProbe {
    pub fn new(
        pool: Arc<WorkerPool>,
        gate: Arc<ConcurrencyGate>,
        backend: Arc<dyn WorkerBackend>,
        config: ProbeConfig,
    ) -> Self {
        Self {
            pool,
            gate,
            backend,
            config,
        }
    }

    /// Probe every configured worker, started or not.
    pub async fn probe_all(&self) -> HealthReport {
        let targets = self.pool.probe_targets();
        info!(workers = targets.len(), "Probing pool");

        let probes = targets
            .into_iter()
            .map(|(config, endpoint)| self.probe_one(config, endpoint));
        let outcomes = join_all(probes).await;

        let report = HealthReport {
            outcomes,
            probe_deadline: self.config.deadline,
            count_timeouts_in_average: self.config.count_timeouts_in_average,
            generated_at: Local::now(),
        };

        info!(
            ok = report.ok_count(),
            timeout = report.timeout_count(),
            fail = report.fail_count(),
            "Probe complete"
        );
        report
    }

    async fn probe_one(&self, config: WorkerConfig, endpoint: String) -> ProbeOutcome {
        let mut payload = GenerationPayload::from_prompt(PROBE_PROMPT);
        payload.max_tokens = Some(PROBE_MAX_TOKENS);

        let request = GenerationRequest {
            model: config.model_tag.clone(),
            messages: payload.messages.clone(),
            stream: false,
            options: Some(payload.options_for(
                config.context_window_tokens,
                config.batch_tokens,
                config.thread_count,
            )),
        };

        let _permit = match self.gate.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return ProbeOutcome {
                    worker_id: config.id,
                    model_tag: config.model_tag,
                    latency: None,
                    status: ProbeStatus::Fail,
                }
            }
        };

        let started = Instant::now();
        let result =
            tokio::time::timeout(self.config.deadline, self.backend.send(&endpoint, &request))
                .await;

        let (latency, status) = match result {
            Err(_) => (None, ProbeStatus::Timeout),
            Ok(Err(_)) => (None, ProbeStatus::Fail),
            Ok(Ok(response)) => match response.content() {
                Some(_) => (Some(started.elapsed()), ProbeStatus::Ok),
                None => (None, ProbeStatus::Fail),
            },
        };

        debug!(worker = config.id, status = %status, "Probe finished");

        ProbeOutcome {
            worker_id: config.id,
            model_tag: config.model_tag,
            latency,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, ScriptedReply};
    use crate::pool::worker::QuantProfile;

    fn configs(n: usize) -> Vec<WorkerConfig> {
        (0..n)
            .map(|id| WorkerConfig {
                id,
                backend_addr: format!("http://127.0.0.1:{}", 11434 + id),
                accelerator_id: 0,
                context_window_tokens: 8192,
                batch_tokens: 512,
                thread_count: 4,
                profile: QuantProfile::new("q4_k_m", 0.25),
                model_tag: "yi:6b-q4_k_m".to_string(),
            })
            .collect()
    }

    fn report(outcomes: Vec<ProbeOutcome>, penalize: bool) -> HealthReport {
        HealthReport {
            outcomes,
            probe_deadline: Duration::from_secs(30),
            count_timeouts_in_average: penalize,
            generated_at: Local::now(),
        }
    }

    fn outcome(id: usize, latency: Option<Duration>, status: ProbeStatus) -> ProbeOutcome {
        ProbeOutcome {
            worker_id: id,
            model_tag: "yi:6b-q4_k_m".to_string(),
            latency,
            status,
        }
    }

    #[test]
    fn test_average_excludes_timeouts() {
        let report = report(
            vec![
                outcome(0, Some(Duration::from_secs(2)), ProbeStatus::Ok),
                outcome(1, None, ProbeStatus::Timeout),
                outcome(2, Some(Duration::from_secs(3)), ProbeStatus::Ok),
            ],
            false,
        );

        // Average over measured probes only: (2.0 + 3.0) / 2 = 2.5s
        assert_eq!(report.average_latency(), Some(Duration::from_millis(2500)));
        assert_eq!(report.ok_count(), 2);
        assert_eq!(report.timeout_count(), 1);
        assert_eq!(report.fail_count(), 0);
    }

    #[test]
    fn test_average_with_timeout_penalty_policy() {
        let report = report(
            vec![
                outcome(0, Some(Duration::from_secs(2)), ProbeStatus::Ok),
                outcome(1, None, ProbeStatus::Timeout),
            ],
            true,
        );

        // (2.0 + 30.0 deadline penalty) / 2 = 16.0s
        assert_eq!(report.average_latency(), Some(Duration::from_secs(16)));
    }

    #[test]
    fn test_average_absent_when_nothing_measured() {
        let report = report(
            vec![
                outcome(0, None, ProbeStatus::Fail),
                outcome(1, None, ProbeStatus::Timeout),
            ],
            false,
        );
        assert_eq!(report.average_latency(), None);
    }

    #[tokio::test]
    async fn test_probe_all_mixed_results() {
        let backend = Arc::new(MockBackend::new());
        backend.push_reply(ScriptedReply::Text("pong".to_string()));
        backend.push_reply(ScriptedReply::Transport("connection refused".to_string()));
        backend.push_reply(ScriptedReply::Text("pong".to_string()));

        let pool = Arc::new(WorkerPool::new(configs(3), backend.clone()));
        let gate = Arc::new(ConcurrencyGate::new(1));
        let probe = HealthProbe::new(
            pool,
            gate,
            backend,
            ProbeConfig {
                deadline: Duration::from_secs(5),
                count_timeouts_in_average: false,
            },
        );

        let report = probe.probe_all().await;

        assert_eq!(report.outcomes.len(), 3);
        // Gate capacity 1 serializes probes, so the script maps to workers
        // in order
        assert_eq!(report.outcomes[0].status, ProbeStatus::Ok);
        assert_eq!(report.outcomes[1].status, ProbeStatus::Fail);
        assert_eq!(report.outcomes[2].status, ProbeStatus::Ok);
        assert!(report.outcomes[0].latency.is_some());
        assert!(report.outcomes[1].latency.is_none());
    }

    #[tokio::test]
    async fn test_probe_does_not_require_started_pool() {
        let backend = Arc::new(MockBackend::new());
        let pool = Arc::new(WorkerPool::new(configs(2), backend.clone()));
        // Pool never started; probes target the configured addresses
        let probe = HealthProbe::new(
            pool,
            Arc::new(ConcurrencyGate::new(2)),
            backend.clone(),
            ProbeConfig::default(),
        );

        let report = probe.probe_all().await;
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.ok_count(), 2);
        assert_eq!(backend.sends_for("http://127.0.0.1:11434"), 1);
        assert_eq!(backend.sends_for("http://127.0.0.1:11435"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_probe_times_out() {
        let backend = Arc::new(MockBackend::new());
        backend.push_reply(ScriptedReply::Stall(
            Duration::from_secs(3600),
            "late".to_string(),
        ));

        let pool = Arc::new(WorkerPool::new(configs(1), backend.clone()));
        let probe = HealthProbe::new(
            pool,
            Arc::new(ConcurrencyGate::new(1)),
            backend,
            ProbeConfig {
                deadline: Duration::from_secs(2),
                count_timeouts_in_average: false,
            },
        );

        let report = probe.probe_all().await;
        assert_eq!(report.outcomes[0].status, ProbeStatus::Timeout);
        assert_eq!(report.timeout_count(), 1);
    }
}
