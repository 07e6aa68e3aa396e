//! Error types for MCP operations.

use std::time::Duration;

use thiserror::Error;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to spawn the MCP server process.
    #[error("failed to spawn MCP server: {0}")]
    SpawnFailed(String),

    /// Failed to establish or use the underlying channel.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The channel vanished: EOF on stdio, or the socket closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// JSON-RPC protocol violation (bad version, unclassifiable message, ...).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server returned an explicit error response.
    #[error("server error {code}: {message}")]
    ServerError {
        /// Error code from the server.
        code: i64,
        /// Error message from the server.
        message: String,
        /// Optional additional data.
        data: Option<serde_json::Value>,
    },

    /// A deadline elapsed (connect, call, receive, ...).
    #[error("timeout after {0:?}: {1}")]
    Timeout(Duration, String),

    /// Server handshake has not completed yet.
    #[error("server not initialized - complete the handshake first")]
    NotInitialized,

    /// No server registered under the given name.
    #[error("unknown server: {0}")]
    ServerNotFound(String),

    /// Routed call issued to a server that is not healthy.
    #[error("server '{0}' is not healthy")]
    ServerUnhealthy(String),

    /// Configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl McpError {
    /// Create a spawn failed error.
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    /// Create a connection failure error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(after: Duration, what: impl Into<String>) -> Self {
        Self::Timeout(after, what.into())
    }

    /// Create a server error from an error response.
    pub fn server_error(
        code: i64,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
            data,
        }
    }

    /// Create a config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error indicates the channel itself is unusable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::SpawnFailed(_) | Self::ConnectionFailed(_) | Self::ConnectionClosed | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = McpError::spawn_failed("command not found");
        assert!(err.to_string().contains("spawn"));
        assert!(err.to_string().contains("command not found"));

        let err = McpError::server_error(-32600, "Invalid Request", None);
        assert!(err.to_string().contains("-32600"));
        assert!(err.to_string().contains("Invalid Request"));

        let err = McpError::timeout(Duration::from_secs(30), "tools/call");
        assert!(err.to_string().contains("tools/call"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let mcp_err: McpError = json_err.into();
        assert!(matches!(mcp_err, McpError::Json(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let mcp_err: McpError = io_err.into();
        assert!(matches!(mcp_err, McpError::Io(_)));
    }

    #[test]
    fn test_is_connection_error() {
        assert!(McpError::ConnectionClosed.is_connection_error());
        assert!(McpError::connection("broken pipe").is_connection_error());
        assert!(!McpError::protocol("bad version").is_connection_error());
        assert!(!McpError::ServerNotFound("x".into()).is_connection_error());
    }
}
