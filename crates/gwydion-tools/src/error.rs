//! Error types for the tool registry.

use thiserror::Error;

use crate::schema::ValidationError;

/// Result type alias for tool operations.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type for tool registry operations.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool registered under the given name.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Arguments failed schema validation.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// Caller policy or server security policy refused the call.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Namespace registration failed.
    #[error("namespace error: {0}")]
    Namespace(String),

    /// Error from the MCP layer.
    #[error(transparent)]
    Mcp(#[from] gwydion_mcp::McpError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Create a permission denied error.
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create a namespace error.
    pub fn namespace(msg: impl Into<String>) -> Self {
        Self::Namespace(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
