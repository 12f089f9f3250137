//! HTTP backend for Ollama-style worker endpoints.
//!
//! Startup pulls the worker's model variant so the first dispatch does not
//! pay the download cost; shutdown asks the endpoint to unload the model.

use crate::backend::types::{GenerationRequest, GenerationResponse, SendError};
use crate::backend::WorkerBackend;
use crate::errors::{PoolError, Result};
use crate::pool::WorkerConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout for model pulls at startup. Pulls can download several GB.
const PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for the best-effort unload request at shutdown.
const UNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpBackend {
    client: Client,
}

impl HttpBackend {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| PoolError::Http(format!("Failed to build HTTP client: {}", e)))?,
        })
    }
}

#[async_trait]
impl WorkerBackend for HttpBackend {
    async fn start(&self, config: &WorkerConfig) -> Result<String> {
        let url = format!("{}/api/pull", config.backend_addr);

        info!(
            worker = config.id,
            model = %config.model_tag,
            addr = %config.backend_addr,
            "Pulling model for worker"
        );

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "name": config.model_tag,
                "insecure": true,
                "stream": false,
            }))
            .timeout(PULL_TIMEOUT)
            .send()
            .await
            .map_err(|e| PoolError::Http(format!("Pull request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "(failed to read response)".to_string());
            return Err(PoolError::Http(format!(
                "Pull of {} returned HTTP {}: {}",
                config.model_tag, status, body
            )));
        }

        info!(worker = config.id, model = %config.model_tag, "Model ready");
        Ok(config.backend_addr.clone())
    }

    async fn stop(&self, config: &WorkerConfig, endpoint: &str) -> Result<()> {
        // keep_alive 0 asks the endpoint to evict the model immediately
        let url = format!("{}/api/generate", endpoint);
        let result = self
            .client
            .post(&url)
            .json(&json!({
                "model": config.model_tag,
                "keep_alive": 0,
            }))
            .timeout(UNLOAD_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(_) => {
                debug!(worker = config.id, "Model unloaded");
                Ok(())
            }
            Err(e) => {
                warn!(worker = config.id, error = %e, "Unload request failed");
                Err(PoolError::Http(format!("Unload failed: {}", e)))
            }
        }
    }

    async fn send(
        &self,
        endpoint: &str,
        request: &GenerationRequest,
    ) -> std::result::Result<GenerationResponse, SendError> {
        let url = format!("{}/api/chat", endpoint);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "(failed to read response)".to_string());
            return Err(SendError::Status {
                code: status.as_u16(),
                body,
            });
        }

        response
            .json::<GenerationResponse>()
            .await
            .map_err(|e| SendError::Decode(e.to_string()))
    }
}
