//! inferpool - dispatch pool for local LLM inference backends
//!
//! ## Commands
//!
//! - `plan` - Compute per-worker configurations for a capacity budget
//! - `probe` - Send one test generation to every configured worker and
//!   report latency/status
//! - `generate` - Start the pool, run one generation, and shut down

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use inferpool::{
    init_production_logging, init_simple_logging, parse_memory_string, plan_workers,
    DispatchConfig, GenerationPayload, GenerationService, HttpBackend, MockBackend, Outcome,
    ResourceSnapshot, WorkerBackend,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Dispatch pool for local LLM inference backends
#[derive(Parser, Debug)]
#[command(name = "inferpool")]
#[command(about = "Resource-aware dispatch pool for local LLM backends", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute per-worker configurations for a capacity budget
    Plan {
        /// Accelerator memory budget (e.g. "24GB", "512MB", or bytes)
        #[arg(short, long)]
        memory: String,

        /// Number of accelerators
        #[arg(short, long, default_value = "1")]
        accelerators: u32,

        /// Desired worker count
        #[arg(short, long, default_value = "4")]
        workers: u32,

        /// Base model name (quantization tag is appended per worker)
        #[arg(long, default_value = "yi:6b")]
        model: String,

        /// First backend port; worker i listens at base_port + i
        #[arg(long, default_value = "11434")]
        base_port: u16,
    },

    /// Probe every configured worker and report latency/status
    Probe {
        /// Config file path (defaults to ~/.inferpool/dispatch.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Use the in-memory mock backend instead of live endpoints
        #[arg(long)]
        mock: bool,

        /// Log level (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "warn")]
        log_level: String,
    },

    /// Start the pool, run one generation, and shut down
    Generate {
        /// Prompt text
        #[arg(short, long)]
        prompt: String,

        /// Config file path (defaults to ~/.inferpool/dispatch.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Use the in-memory mock backend instead of live endpoints
        #[arg(long)]
        mock: bool,

        /// Log level (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "info")]
        log_level: String,

        /// Also write logs to rotating files under ~/.inferpool/logs
        #[arg(long)]
        log_file: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            memory,
            accelerators,
            workers,
            model,
            base_port,
        } => {
            init_simple_logging("warn").ok();
            let budget = parse_memory_string(&memory)?;
            let snapshot = ResourceSnapshot::detect(budget, accelerators);
            let configs = plan_workers(&snapshot, workers, &model, base_port)?;

            println!("\n{}", "Worker Plan".bold().cyan());
            println!("{}", "===========".cyan());
            println!(
                "{:<8} {:<20} {:<6} {:<10} {:<8} {:<8} {}",
                "WORKER", "MODEL", "GPU", "CONTEXT", "BATCH", "THREADS", "ADDRESS"
            );
            println!("{}", "-".repeat(80));
            for config in &configs {
                println!(
                    "{:<8} {:<20} {:<6} {:<10} {:<8} {:<8} {}",
                    config.id,
                    config.model_tag,
                    config.accelerator_id,
                    config.context_window_tokens,
                    config.batch_tokens,
                    config.thread_count,
                    config.backend_addr
                );
            }
            println!(
                "\n{} workers over {} accelerator(s), {} cores detected\n",
                configs.len(),
                accelerators,
                snapshot.cpu_cores
            );
        }

        Commands::Probe {
            config,
            mock,
            log_level,
        } => {
            init_simple_logging(&log_level).ok();
            let (service, _config) = build_service(config, mock)?;
            let report = service.probe_all().await;
            report.display();
        }

        Commands::Generate {
            prompt,
            config,
            mock,
            log_level,
            log_file,
        } => {
            if log_file {
                init_production_logging(&log_level, None).ok();
            } else {
                init_simple_logging(&log_level).ok();
            }
            let (service, _config) = build_service(config, mock)?;

            info!("Starting worker pool");
            service.start().await.context("Failed to start worker pool")?;

            let result = service
                .submit(GenerationPayload::from_prompt(&prompt))
                .await;

            service.stop().await;

            match result? {
                Outcome::Success { text, latency } => {
                    println!(
                        "\n{} ({:.2}s)\n\n{}\n",
                        "Generation complete".green().bold(),
                        latency.as_secs_f64(),
                        text
                    );
                }
                Outcome::Retryable(reason) => {
                    // submit() resolves retryable outcomes before returning
                    println!("{} {}", "Incomplete:".yellow().bold(), reason);
                }
                Outcome::Fatal(reason) => {
                    println!("{} {}", "Failed:".red().bold(), reason);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Build a generation service from config, planning workers against the
/// configured capacity budget.
fn build_service(
    config_path: Option<PathBuf>,
    mock: bool,
) -> Result<(GenerationService, DispatchConfig)> {
    let path = match config_path {
        Some(p) => p,
        None => DispatchConfig::default_path()?,
    };

    let config = if path.exists() {
        info!(path = %path.display(), "Loading dispatch config");
        DispatchConfig::load(&path)?
    } else {
        info!("No config file found, using defaults");
        DispatchConfig::default()
    };

    let snapshot = ResourceSnapshot::detect(config.accelerator_memory, config.accelerator_count);
    let workers = plan_workers(&snapshot, config.worker_count, &config.model, config.base_port)?;

    let backend: Arc<dyn WorkerBackend> = if mock {
        Arc::new(MockBackend::new())
    } else {
        Arc::new(HttpBackend::new()?)
    };

    let service = GenerationService::new(workers, backend, &config)?;
    Ok((service, config))
}
