//! Backend seam: one uniform "send request" capability per worker.
//!
//! All backend variants (quantized model flavors, mock) are driven through
//! the same trait; per-worker differences live entirely in `WorkerConfig`.

pub mod http;
pub mod mock;
pub mod types;

pub use http::HttpBackend;
pub use mock::{MockBackend, ScriptedReply};
pub use types::{
    ChatMessage, GenerationOptions, GenerationRequest, GenerationResponse, SendError,
};

use crate::errors::Result;
use crate::pool::WorkerConfig;
use async_trait::async_trait;

/// Capability a worker backend must provide to the pool and dispatcher.
#[async_trait]
pub trait WorkerBackend: Send + Sync {
    /// Initialize one backend instance for the given worker configuration.
    ///
    /// Returns the endpoint URL requests for this worker should target.
    /// Must be cancel-safe up to the point of returning: a failed start
    /// leaves nothing the pool needs to clean up beyond calling [`stop`].
    ///
    /// [`stop`]: WorkerBackend::stop
    async fn start(&self, config: &WorkerConfig) -> Result<String>;

    /// Tear down the backend instance behind the given endpoint. Best-effort.
    async fn stop(&self, config: &WorkerConfig, endpoint: &str) -> Result<()>;

    /// Send one generation request to a worker endpoint.
    ///
    /// The caller owns deadline enforcement; implementations should not apply
    /// their own overall request timeout.
    async fn send(
        &self,
        endpoint: &str,
        request: &GenerationRequest,
    ) -> std::result::Result<GenerationResponse, SendError>;
}
