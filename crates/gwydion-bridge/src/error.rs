//! Error types for the bridge layer.

use std::time::Duration;

use thiserror::Error;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Error type for bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The integration has not been initialized yet.
    #[error("MCP integration not initialized - call initialize() first")]
    NotInitialized,

    /// The worker thread or its runtime is unavailable.
    #[error("worker unavailable: {0}")]
    Worker(String),

    /// A bridged call exceeded its deadline.
    #[error("bridged call timed out after {0:?}")]
    Timeout(Duration),
}

impl BridgeError {
    /// Create a worker error.
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }
}
