//! Tool execution results and result streaming.
//!
//! An execution produces a lazy finite sequence of [`ToolResult`]s; the
//! sequence always terminates with a success or error result. Intermediate
//! progress/info/output results may precede the terminal one.

use std::collections::HashMap;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a single result conveys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultKind {
    /// Terminal: the execution succeeded.
    Success,
    /// Terminal: the execution failed.
    Error,
    /// Non-fatal problem worth surfacing.
    Warning,
    /// Informational message.
    Info,
    /// Execution progress.
    Progress,
    /// Incremental output.
    Output,
}

impl ToolResultKind {
    /// Whether this kind ends the sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl std::fmt::Display for ToolResultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Progress => "progress",
            Self::Output => "output",
        };
        write!(f, "{}", s)
    }
}

/// One element of an execution's result sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Result classification.
    pub kind: ToolResultKind,
    /// Result content.
    pub content: String,
    /// Name of the tool that produced this result.
    pub tool_name: String,
    /// Opaque correlation token for the execution.
    pub execution_id: String,
    /// When the result was produced.
    pub timestamp: DateTime<Utc>,
    /// Additional structured metadata.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ToolResult {
    /// Create a result of the given kind.
    pub fn new(
        kind: ToolResultKind,
        content: impl Into<String>,
        tool_name: impl Into<String>,
        execution_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            content: content.into(),
            tool_name: tool_name.into(),
            execution_id: execution_id.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Create a success result.
    pub fn success(
        content: impl Into<String>,
        tool_name: impl Into<String>,
        execution_id: impl Into<String>,
    ) -> Self {
        Self::new(ToolResultKind::Success, content, tool_name, execution_id)
    }

    /// Create an error result.
    pub fn error(
        content: impl Into<String>,
        tool_name: impl Into<String>,
        execution_id: impl Into<String>,
    ) -> Self {
        Self::new(ToolResultKind::Error, content, tool_name, execution_id)
    }

    /// Create a progress result.
    pub fn progress(
        content: impl Into<String>,
        tool_name: impl Into<String>,
        execution_id: impl Into<String>,
    ) -> Self {
        Self::new(ToolResultKind::Progress, content, tool_name, execution_id)
    }

    /// Create an info result.
    pub fn info(
        content: impl Into<String>,
        tool_name: impl Into<String>,
        execution_id: impl Into<String>,
    ) -> Self {
        Self::new(ToolResultKind::Info, content, tool_name, execution_id)
    }

    /// Create an output result.
    pub fn output(
        content: impl Into<String>,
        tool_name: impl Into<String>,
        execution_id: impl Into<String>,
    ) -> Self {
        Self::new(ToolResultKind::Output, content, tool_name, execution_id)
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether this result ends the sequence.
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Whether this is an error result.
    pub fn is_error(&self) -> bool {
        self.kind == ToolResultKind::Error
    }
}

/// A lazy finite sequence of tool results.
pub type ResultStream = Pin<Box<dyn Stream<Item = ToolResult> + Send>>;

/// Wrap a single result as a stream.
pub fn single(result: ToolResult) -> ResultStream {
    Box::pin(futures::stream::once(async move { result }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_kinds_terminal() {
        assert!(ToolResultKind::Success.is_terminal());
        assert!(ToolResultKind::Error.is_terminal());
        assert!(!ToolResultKind::Progress.is_terminal());
        assert!(!ToolResultKind::Info.is_terminal());
        assert!(!ToolResultKind::Output.is_terminal());
        assert!(!ToolResultKind::Warning.is_terminal());
    }

    #[test]
    fn test_constructors() {
        let result = ToolResult::success("done", "files:read", "exec-1")
            .with_metadata("server", "files");
        assert_eq!(result.kind, ToolResultKind::Success);
        assert_eq!(result.content, "done");
        assert_eq!(result.tool_name, "files:read");
        assert_eq!(result.execution_id, "exec-1");
        assert_eq!(result.metadata["server"], "files");
        assert!(result.is_terminal());
        assert!(!result.is_error());
    }

    #[test]
    fn test_serialization_round_trip() {
        let result = ToolResult::error("boom", "t", "e").with_metadata("error_type", "execution_error");
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"kind\":\"error\""));
        let restored: ToolResult = serde_json::from_str(&json).unwrap();
        assert!(restored.is_error());
        assert_eq!(restored.metadata["error_type"], "execution_error");
    }

    #[tokio::test]
    async fn test_single_stream() {
        let mut stream = single(ToolResult::success("ok", "t", "e"));
        let first = stream.next().await.unwrap();
        assert!(first.is_terminal());
        assert!(stream.next().await.is_none());
    }
}
