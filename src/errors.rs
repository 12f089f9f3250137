use thiserror::Error;

/// Errors that can occur in the dispatch pool.
#[derive(Error, Debug)]
pub enum PoolError {
    /// IO error occurred (file operations, config persistence, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Capacity planning failed (no accelerators, zero workers, budget too small)
    #[error("Resource planning error: {0}")]
    Planning(String),

    /// A backend worker failed to initialize during pool startup
    #[error("Worker {worker} failed to initialize: {reason}")]
    ResourceInit { worker: usize, reason: String },

    /// No worker in the pool is currently READY
    #[error("Pool exhausted: no READY worker available")]
    Exhausted,

    /// The admission gate was closed while a caller was waiting
    #[error("Admission gate closed")]
    GateClosed,

    /// HTTP-level error talking to a backend outside the dispatch path
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

impl From<toml::ser::Error> for PoolError {
    fn from(e: toml::ser::Error) -> Self {
        PoolError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for PoolError {
    fn from(e: toml::de::Error) -> Self {
        PoolError::Serialization(e.to_string())
    }
}
