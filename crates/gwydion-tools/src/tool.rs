//! The tool capability set.
//!
//! Every tool, whether authored in-process or wrapped from an MCP server,
//! exposes the same surface: a schema, local validation, a permission check,
//! and streaming execution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::result::ResultStream;
use crate::schema::{SchemaValidator, ValidationError};

/// Where a tool comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Authored inside the host application.
    Native,
    /// Wrapped from a remote MCP server.
    Mcp,
}

/// Context provided to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Session this execution belongs to, if any.
    pub session_id: Option<String>,
    /// Correlation token for this execution.
    pub execution_id: String,
    /// Token to check for cancellation.
    pub cancellation: CancellationToken,
    /// Session-scoped context passed through to tools that advertise
    /// support for it.
    pub session_context: Option<HashMap<String, Value>>,
}

impl ToolContext {
    /// Create a fresh context with a generated execution id.
    pub fn new() -> Self {
        Self {
            session_id: None,
            execution_id: uuid::Uuid::new_v4().to_string(),
            cancellation: CancellationToken::new(),
            session_context: None,
        }
    }

    /// Attach a session id.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attach session-scoped context.
    pub fn with_session_context(mut self, context: HashMap<String, Value>) -> Self {
        self.session_context = Some(context);
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Check if execution has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Default for ToolContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability set every tool satisfies.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Globally addressable name of this tool.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Native or MCP-wrapped.
    fn kind(&self) -> ToolKind;

    /// The advertised JSON Schema for this tool's input, if any.
    fn input_schema(&self) -> Option<&Value> {
        None
    }

    /// Validate arguments locally, before any remote round-trip.
    fn validate_input(&self, arguments: &Value) -> std::result::Result<(), ValidationError> {
        SchemaValidator::from_schema(self.input_schema()).validate(arguments)
    }

    /// Check caller and security policy. The default admits everything.
    async fn check_permissions(&self, _arguments: &Value, _ctx: &ToolContext) -> Result<()> {
        Ok(())
    }

    /// Execute the tool, producing a lazy finite result sequence that
    /// terminates with a success or error result.
    fn execute(self: Arc<Self>, arguments: Value, ctx: ToolContext) -> ResultStream;
}


#[cfg(test)]
mod tests {
    use super::testing::StaticTool;
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[test]
    fn test_context_defaults() {
        let ctx = ToolContext::new();
        assert!(ctx.session_id.is_none());
        assert!(!ctx.execution_id.is_empty());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_context_cancellation() {
        let token = CancellationToken::new();
        let ctx = ToolContext::new().with_cancellation(token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_default_validation_uses_schema() {
        let tool = StaticTool::new("t", "ok").with_schema(json!({
            "type": "object",
            "properties": {"q": {"type": "string"}},
            "required": ["q"]
        }));
        tool.validate_input(&json!({"q": "hello"})).unwrap();
        assert!(tool.validate_input(&json!({})).is_err());
    }

    #[tokio::test]
    async fn test_static_tool_executes() {
        let tool = Arc::new(StaticTool::new("t", "hello"));
        let mut stream = tool.execute(json!({}), ToolContext::new());
        let result = stream.next().await.unwrap();
        assert!(result.is_terminal());
        assert_eq!(result.content, "hello");
        assert!(stream.next().await.is_none());
    }
}
