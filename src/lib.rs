pub mod backend;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod observability;
pub mod planner;
pub mod pool;
pub mod probe;
pub mod service;

pub use backend::{ChatMessage, HttpBackend, MockBackend, WorkerBackend};
pub use config::DispatchConfig;
pub use dispatch::{
    BatchCoordinator, ConcurrencyGate, Dispatcher, FatalReason, GenerationPayload, Outcome,
    RequestEnvelope, RetryController, RetryPolicy, RetryReason,
};
pub use errors::{PoolError, Result};
pub use observability::{init_production_logging, init_simple_logging};
pub use planner::{parse_memory_string, plan_workers, ResourceSnapshot};
pub use pool::{QuantProfile, WorkerConfig, WorkerPool, WorkerStatus};
pub use probe::{HealthProbe, HealthReport, ProbeConfig, ProbeOutcome, ProbeStatus};
pub use service::GenerationService;
