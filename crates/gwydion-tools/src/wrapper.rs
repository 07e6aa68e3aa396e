//! Adapter that exposes a remote MCP tool as a [`Tool`].
//!
//! The wrapper carries a precompiled input validator, the owning server's
//! security policy, and the namespaced full name the registry addresses it
//! by. Execution streams a progress result, routes the call through the
//! server manager, and translates the remote outcome into a terminal result;
//! failures become error results, never raised errors.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};

use gwydion_mcp::{CallToolResult, McpError, McpServerManager, SecurityPolicy, ToolInfo};

use crate::error::{Result, ToolError};
use crate::permissions::{OperationClassifier, PermissionManager, check_security_policy};
use crate::result::{ResultStream, ToolResult};
use crate::schema::{SchemaValidator, ValidationError};
use crate::tool::{Tool, ToolContext, ToolKind};

/// Bookkeeping fields never forwarded to the remote tool.
const INTERNAL_FIELDS: [&str; 4] = ["execution_id", "metadata", "session_id", "session_context"];

/// Schema tokens that signal a tool accepts session context.
const SESSION_TOKENS: [&str; 2] = ["session", "_session_context"];

/// A remote MCP tool admitted into the registry.
pub struct McpToolWrapper {
    full_name: String,
    description: String,
    server_name: String,
    original_name: String,
    schema: Option<Value>,
    validator: SchemaValidator,
    security: SecurityPolicy,
    manager: Arc<McpServerManager>,
    permissions: Arc<dyn PermissionManager>,
    classifier: Arc<OperationClassifier>,
}

impl McpToolWrapper {
    /// Wrap one advertised tool.
    pub fn new(
        info: &ToolInfo,
        server_name: impl Into<String>,
        full_name: impl Into<String>,
        manager: Arc<McpServerManager>,
        permissions: Arc<dyn PermissionManager>,
        classifier: Arc<OperationClassifier>,
        security: SecurityPolicy,
    ) -> Self {
        let server_name = server_name.into();
        let description = match &info.description {
            Some(d) => format!("[MCP:{}] {}", server_name, d),
            None => format!("[MCP:{}] MCP tool: {}", server_name, info.name),
        };
        let validator = SchemaValidator::from_schema(info.input_schema.as_ref());
        Self {
            full_name: full_name.into(),
            description,
            server_name,
            original_name: info.name.clone(),
            schema: info.input_schema.clone(),
            validator,
            security,
            manager,
            permissions,
            classifier,
        }
    }

    /// The owning server's name.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// The tool name as the server advertises it.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Whether the advertised schema signals session-context support.
    ///
    /// Keyword sniffing over the serialized schema; servers that want the
    /// context reliably should advertise an explicit `_session_context`
    /// property.
    pub fn supports_session_context(&self) -> bool {
        let Some(schema) = &self.schema else {
            return false;
        };
        let schema_text = schema.to_string().to_lowercase();
        SESSION_TOKENS.iter().any(|token| schema_text.contains(token))
    }

    /// Arguments as sent over the wire: bookkeeping fields stripped,
    /// `_session_context` injected when the tool supports it.
    pub fn remote_arguments(&self, arguments: &Value, ctx: &ToolContext) -> Value {
        let mut remote: Map<String, Value> = arguments
            .as_object()
            .map(|o| {
                o.iter()
                    .filter(|(key, _)| !INTERNAL_FIELDS.contains(&key.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(session_context) = &ctx.session_context {
            if self.supports_session_context() {
                let context: Map<String, Value> = session_context
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                remote.insert("_session_context".to_string(), Value::Object(context));
            } else {
                tracing::debug!(
                    tool = %self.original_name,
                    "session context available but not advertised by tool schema"
                );
            }
        }

        Value::Object(remote)
    }

    fn format_content(result: &CallToolResult) -> String {
        match result.text() {
            Some(text) => text,
            None => serde_json::to_string_pretty(&result.content).unwrap_or_default(),
        }
    }
}

/// Stable tag for an MCP-layer failure.
fn error_type_for(error: &McpError) -> &'static str {
    match error {
        e if e.is_connection_error() => "connection_error",
        McpError::ServerNotFound(_) | McpError::NotInitialized | McpError::ServerUnhealthy(_) => {
            "connection_error"
        }
        McpError::ServerError { code, .. }
            if *code == gwydion_mcp::error_codes::TOOL_NOT_FOUND
                || *code == gwydion_mcp::error_codes::METHOD_NOT_FOUND =>
        {
            "tool_not_found"
        }
        _ => "execution_error",
    }
}

impl std::fmt::Debug for McpToolWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpToolWrapper")
            .field("full_name", &self.full_name)
            .field("server", &self.server_name)
            .field("original_name", &self.original_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for McpToolWrapper {
    fn name(&self) -> &str {
        &self.full_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Mcp
    }

    fn input_schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }

    fn validate_input(&self, arguments: &Value) -> std::result::Result<(), ValidationError> {
        self.validator.validate(arguments)
    }

    async fn check_permissions(&self, arguments: &Value, _ctx: &ToolContext) -> Result<()> {
        if !self
            .permissions
            .check_tool_permission(&self.full_name, arguments)
            .await
        {
            return Err(ToolError::permission_denied(format!(
                "tool '{}' denied by caller policy",
                self.full_name
            )));
        }
        check_security_policy(
            &self.security,
            &self.classifier,
            &self.original_name,
            arguments,
        )
        .map_err(ToolError::permission_denied)
    }

    fn execute(self: Arc<Self>, arguments: Value, ctx: ToolContext) -> ResultStream {
        Box::pin(async_stream::stream! {
            let started = Instant::now();
            let execution_id = ctx.execution_id.clone();

            yield ToolResult::progress(
                format!(
                    "Executing MCP tool '{}' on server '{}'",
                    self.original_name, self.server_name
                ),
                &self.full_name,
                &execution_id,
            );

            let remote_args = self.remote_arguments(&arguments, &ctx);
            let outcome = self
                .manager
                .call_tool(&self.server_name, &self.original_name, Some(remote_args))
                .await;
            let elapsed = started.elapsed().as_secs_f64();

            match outcome {
                Ok(result) if result.is_error() => {
                    let message = result
                        .text()
                        .unwrap_or_else(|| "Unknown MCP error".to_string());
                    yield ToolResult::error(
                        format!("MCP tool error: {}", message),
                        &self.full_name,
                        &execution_id,
                    )
                    .with_metadata("error_type", "mcp_tool_error")
                    .with_metadata("server_name", self.server_name.clone())
                    .with_metadata("execution_time", elapsed);
                }
                Ok(result) => {
                    let mut success = ToolResult::success(
                        Self::format_content(&result),
                        &self.full_name,
                        &execution_id,
                    )
                    .with_metadata("server_name", self.server_name.clone())
                    .with_metadata("original_tool_name", self.original_name.clone())
                    .with_metadata("execution_time", elapsed);
                    if let Some(metadata) = result.metadata {
                        success = success.with_metadata("mcp_metadata", metadata);
                    }
                    yield success;
                }
                Err(e) => {
                    tracing::warn!(
                        server = %self.server_name,
                        tool = %self.original_name,
                        error = %e,
                        "MCP tool call failed"
                    );
                    yield ToolResult::error(
                        format!("MCP tool call failed: {}", e),
                        &self.full_name,
                        &execution_id,
                    )
                    .with_metadata("error_type", error_type_for(&e))
                    .with_metadata("server_name", self.server_name.clone())
                    .with_metadata("execution_time", elapsed);
                }
            }
        })
    }
}
