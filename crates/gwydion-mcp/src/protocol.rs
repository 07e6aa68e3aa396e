//! JSON-RPC 2.0 protocol layer for MCP.
//!
//! Two things live here: the wire types (the [`McpMessage`] envelope plus the
//! typed MCP request/result structures), and the [`McpProtocol`] engine that
//! multiplexes concurrent requests over a single transport.
//!
//! The engine owns the pending-request table and is the only component that
//! generates request ids. A background reader task pulls messages off the
//! transport and completes the matching waiter; responses are correlated by
//! id, never by send order.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{McpError, Result};
use crate::transport::McpTransport;

/// JSON-RPC version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Standard MCP method names.
pub mod methods {
    /// Handshake request.
    pub const INITIALIZE: &str = "initialize";
    /// Liveness probe.
    pub const PING: &str = "ping";
    /// Enumerate tools.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Invoke a tool.
    pub const TOOLS_CALL: &str = "tools/call";
    /// Enumerate resources.
    pub const RESOURCES_LIST: &str = "resources/list";
    /// Enumerate prompt templates.
    pub const PROMPTS_LIST: &str = "prompts/list";
    /// Client-to-server notification after a successful initialize.
    pub const NOTIFICATIONS_INITIALIZED: &str = "notifications/initialized";
    /// Cancellation notification.
    pub const NOTIFICATIONS_CANCELLED: &str = "notifications/cancelled";
}

/// JSON-RPC and MCP error codes.
pub mod error_codes {
    /// Invalid JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// Not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// Method not found.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid params.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal error.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Tool not found (MCP extension).
    pub const TOOL_NOT_FOUND: i64 = -32000;
    /// Resource not found (MCP extension).
    pub const RESOURCE_NOT_FOUND: i64 = -32001;
    /// Security policy violation (MCP extension).
    pub const SECURITY_ERROR: i64 = -32002;
    /// Timeout (MCP extension).
    pub const TIMEOUT_ERROR: i64 = -32003;
}

// ─────────────────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────────────────

/// A JSON-RPC message id: string or integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    /// Numeric id (what this client generates).
    Num(u64),
    /// String id (accepted from remotes).
    Str(String),
}

impl MessageId {
    /// The numeric value, if this is a numeric id.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Str(_) => None,
        }
    }
}

impl From<u64> for MessageId {
    fn from(n: u64) -> Self {
        Self::Num(n)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{}", n),
            Self::Str(s) => write!(f, "{}", s),
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
    /// Optional additional data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A single JSON-RPC envelope.
///
/// Exactly one classification holds for any valid message:
/// request (method + id), notification (method, no id), or response
/// (id, no method, one of result/error).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpMessage {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Message id; present for requests and responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Method name; present for requests and notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Result payload; present for successful responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload; present for error responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl McpMessage {
    /// Create a request message.
    pub fn request(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(MessageId::Num(id)),
            method: Some(method.into()),
            params,
            result: None,
            error: None,
        }
    }

    /// Create a notification message.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: Some(method.into()),
            params,
            result: None,
            error: None,
        }
    }

    /// Parse a message from raw bytes, rejecting non-"2.0" versions.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let message: Self = serde_json::from_slice(bytes)
            .map_err(|e| McpError::protocol(format!("invalid JSON: {}", e)))?;
        if message.jsonrpc != JSONRPC_VERSION {
            return Err(McpError::protocol(format!(
                "invalid JSON-RPC version: {}",
                message.jsonrpc
            )));
        }
        Ok(message)
    }

    /// Serialize to bytes. Standard JSON escaping guarantees the output
    /// contains no raw newline, so the line framing stays intact.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Check if this message is a request (method + id).
    pub fn is_request(&self) -> bool {
        self.method.is_some() && self.id.is_some()
    }

    /// Check if this message is a notification (method, no id).
    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    /// Check if this message is a response (id, no method).
    pub fn is_response(&self) -> bool {
        self.method.is_none() && self.id.is_some()
    }

    /// Check if this message carries an error payload.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extract the result, or the error, from a response.
    pub fn into_result(self) -> Result<Value> {
        if let Some(error) = self.error {
            Err(McpError::server_error(error.code, error.message, error.data))
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MCP Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Client capabilities sent during initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    /// Experimental capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
    /// Sampling capability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Value>,
}

/// Client info sent during initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "gwydion".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version.
    pub protocol_version: String,
    /// Client capabilities.
    pub capabilities: ClientCapabilities,
    /// Client info.
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo::default(),
        }
    }
}

/// Tools capability details.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// Whether the server supports change notifications for the tool list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Server capabilities returned during initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tools capability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    /// Resources capability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    /// Prompts capability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Value>,
    /// Logging capability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
    /// Experimental capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
}

/// Server info returned during initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

/// Result of the initialize request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol version.
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
    /// Server info.
    pub server_info: ServerInfo,
}

/// A tool advertisement from a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name (unique per server).
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    #[serde(
        rename = "inputSchema",
        alias = "input_schema",
        skip_serializing_if = "Option::is_none"
    )]
    pub input_schema: Option<Value>,
}

/// Result of the tools/list request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// List of available tools.
    pub tools: Vec<ToolInfo>,
}

/// Parameters for the tools/call request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments to pass to the tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Content item in a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
    /// Image content (base64 encoded).
    Image {
        /// Base64-encoded image data.
        data: String,
        /// MIME type of the image.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Resource reference.
    Resource {
        /// Resource URI.
        uri: String,
        /// Optional resource text.
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// Optional MIME type.
        #[serde(skip_serializing_if = "Option::is_none", rename = "mimeType")]
        mime_type: Option<String>,
    },
}

/// Result of the tools/call request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    /// Server-supplied metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl CallToolResult {
    /// Get the concatenated text content from the result.
    pub fn text(&self) -> Option<String> {
        let parts: Vec<String> = self
            .content
            .iter()
            .filter_map(|c| match c {
                ToolContent::Text { text } => Some(text.clone()),
                ToolContent::Resource { text: Some(t), .. } => Some(t.clone()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    /// Check if the tool call was an error.
    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

/// A resource advertisement from a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Resource URI.
    pub uri: String,
    /// Resource name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource.
    #[serde(
        rename = "mimeType",
        alias = "mime_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub mime_type: Option<String>,
}

/// Result of the resources/list request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResourcesResult {
    /// List of available resources.
    #[serde(default)]
    pub resources: Vec<ResourceInfo>,
}

/// A prompt template advertisement from a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptInfo {
    /// Prompt name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Prompt arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Value>,
}

/// Result of the prompts/list request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListPromptsResult {
    /// List of available prompts.
    #[serde(default)]
    pub prompts: Vec<PromptInfo>,
}

/// Result of the ping request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResult {
    /// Always true from a live server.
    #[serde(default)]
    pub pong: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Protocol Engine
// ─────────────────────────────────────────────────────────────────────────────

type Waiter = oneshot::Sender<Result<McpMessage>>;
type PendingTable = Arc<Mutex<HashMap<u64, Waiter>>>;

/// Lifecycle state of a protocol instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// No reader running yet.
    Idle,
    /// Reader running, calls admitted.
    Receiving,
    /// Shut down; calls rejected.
    Shut,
}

struct ProtocolInner {
    state: ProtocolState,
    reader: Option<JoinHandle<()>>,
}

/// JSON-RPC request/response correlator over a single transport.
///
/// Any number of `call_method` invocations may be outstanding at once; the
/// per-protocol async mutex serializes only reader management and the send
/// itself, and the response is awaited outside the lock. If the reader task
/// dies out from under us (its host runtime was torn down, or the transport
/// failed), the next call discards every stale waiter and rebinds the reader
/// to the current runtime.
pub struct McpProtocol {
    transport: Arc<McpTransport>,
    pending: PendingTable,
    next_id: AtomicU64,
    call_timeout: Duration,
    inner: tokio::sync::Mutex<ProtocolInner>,
}

impl McpProtocol {
    /// Create a protocol engine over the given transport.
    pub fn new(transport: Arc<McpTransport>) -> Self {
        Self {
            transport,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            inner: tokio::sync::Mutex::new(ProtocolInner {
                state: ProtocolState::Idle,
                reader: None,
            }),
        }
    }

    /// Set the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The transport this protocol drives.
    pub fn transport(&self) -> &Arc<McpTransport> {
        &self.transport
    }

    /// Number of in-flight requests.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ProtocolState {
        self.inner.lock().await.state
    }

    /// Call a method and await its response.
    ///
    /// Allocates a fresh id, registers a waiter, sends the request, then
    /// awaits the response under the per-call timeout. An error response
    /// surfaces as [`McpError::ServerError`]; a timeout removes the waiter
    /// and surfaces as [`McpError::Timeout`].
    pub async fn call_method(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let (id, rx) = {
            let mut inner = self.inner.lock().await;
            if inner.state == ProtocolState::Shut {
                return Err(McpError::protocol("not connected"));
            }
            self.ensure_reader(&mut inner);

            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let request = McpMessage::request(id, method, params);
            let bytes = request.to_bytes()?;

            let (tx, rx) = oneshot::channel();
            self.pending.lock().insert(id, tx);

            if let Err(e) = self.transport.send(&bytes).await {
                self.pending.lock().remove(&id);
                return Err(e);
            }
            (id, rx)
        };

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(Ok(message))) => message.into_result(),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(McpError::ConnectionClosed),
            Err(_) => {
                // Late responses for this id will be discarded by the reader.
                self.pending.lock().remove(&id);
                Err(McpError::timeout(self.call_timeout, method.to_string()))
            }
        }
    }

    /// Send a notification (no id, no waiter, no response).
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        let inner = self.inner.lock().await;
        if inner.state == ProtocolState::Shut {
            return Err(McpError::protocol("not connected"));
        }
        let notification = McpMessage::notification(method, params);
        let bytes = notification.to_bytes()?;
        self.transport.send(&bytes).await?;
        drop(inner);
        Ok(())
    }

    /// Shut down: cancel the reader and every pending waiter.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(reader) = inner.reader.take() {
            reader.abort();
        }
        // Dropping the senders cancels the waiters.
        self.pending.lock().clear();
        inner.state = ProtocolState::Shut;
        tracing::debug!("protocol shut down");
    }

    /// Start the reader if it is not running, discarding waiters from a
    /// previous binding whose reader is gone.
    fn ensure_reader(&self, inner: &mut ProtocolInner) {
        let stale = inner
            .reader
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(false);
        if stale {
            tracing::warn!("protocol reader is gone, rebinding to the current runtime");
            inner.reader = None;
            self.pending.lock().clear();
        }
        if inner.reader.is_none() {
            let transport = Arc::clone(&self.transport);
            let pending = Arc::clone(&self.pending);
            inner.reader = Some(tokio::spawn(reader_loop(transport, pending)));
            inner.state = ProtocolState::Receiving;
        }
    }
}

impl std::fmt::Debug for McpProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpProtocol")
            .field("pending", &self.pending.lock().len())
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

/// Background reader: receive, parse, route, until the transport fails.
async fn reader_loop(transport: Arc<McpTransport>, pending: PendingTable) {
    loop {
        if !transport.is_connected() {
            fail_pending(&pending, || McpError::ConnectionClosed);
            break;
        }
        match transport.receive().await {
            Ok(bytes) => match McpMessage::from_slice(&bytes) {
                Ok(message) => route_message(message, &pending),
                Err(e) => {
                    let reason = e.to_string();
                    tracing::error!(error = %reason, "failed to parse incoming message");
                    fail_pending(&pending, || McpError::protocol(reason.clone()));
                    break;
                }
            },
            Err(e) => {
                let reason = e.to_string();
                tracing::debug!(error = %reason, "transport receive failed, reader exiting");
                fail_pending(&pending, || match &e {
                    McpError::ConnectionClosed => McpError::ConnectionClosed,
                    _ => McpError::connection(reason.clone()),
                });
                break;
            }
        }
    }
}

fn route_message(message: McpMessage, pending: &PendingTable) {
    if message.is_response() {
        let id = message.id.as_ref().and_then(MessageId::as_u64);
        let waiter = id.and_then(|id| pending.lock().remove(&id));
        match waiter {
            // Delivery fails only if the caller already gave up; that is the
            // timeout/late-response race and the message is simply dropped.
            Some(tx) => {
                let _ = tx.send(Ok(message));
            }
            None => {
                tracing::debug!(
                    id = %message.id.as_ref().map(|i| i.to_string()).unwrap_or_default(),
                    "discarding response with no pending request"
                );
            }
        }
    } else if message.is_notification() {
        tracing::debug!(
            method = %message.method.as_deref().unwrap_or(""),
            "received notification"
        );
    } else {
        tracing::warn!("discarding unclassifiable message");
    }
}

fn fail_pending(pending: &PendingTable, make_error: impl Fn() -> McpError) {
    let waiters: Vec<Waiter> = {
        let mut table = pending.lock();
        table.drain().map(|(_, tx)| tx).collect()
    };
    for tx in waiters {
        let _ = tx.send(Err(make_error()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = McpMessage::request(1, "initialize", Some(serde_json::json!({"test": true})));
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
    }

    #[test]
    fn test_classification_exclusive() {
        let req = McpMessage::request(1, "ping", None);
        assert!(req.is_request());
        assert!(!req.is_notification());
        assert!(!req.is_response());

        let note = McpMessage::notification("notifications/initialized", None);
        assert!(note.is_notification());
        assert!(!note.is_request());
        assert!(!note.is_response());

        let resp = McpMessage::from_slice(br#"{"jsonrpc":"2.0","id":1,"result":{"v":42}}"#).unwrap();
        assert!(resp.is_response());
        assert!(!resp.is_request());
        assert!(!resp.is_notification());
    }

    #[test]
    fn test_round_trip_equality() {
        let original = McpMessage::request(
            7,
            "tools/call",
            Some(serde_json::json!({"name": "echo", "arguments": {"message": "hi"}})),
        );
        let bytes = original.to_bytes().unwrap();
        let parsed = McpMessage::from_slice(&bytes).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_embedded_newline_stays_escaped() {
        let req = McpMessage::request(
            1,
            "tools/call",
            Some(serde_json::json!({"text": "line one\nline two"})),
        );
        let bytes = req.to_bytes().unwrap();
        assert!(!bytes.contains(&b'\n'));
        let parsed = McpMessage::from_slice(&bytes).unwrap();
        assert_eq!(parsed.params.unwrap()["text"], "line one\nline two");
    }

    #[test]
    fn test_reject_bad_version() {
        let err = McpMessage::from_slice(br#"{"jsonrpc":"1.0","id":1,"result":null}"#).unwrap_err();
        assert!(matches!(err, McpError::Protocol(_)));
    }

    #[test]
    fn test_string_id_round_trip() {
        let msg =
            McpMessage::from_slice(br#"{"jsonrpc":"2.0","id":"req_9","result":{}}"#).unwrap();
        assert_eq!(msg.id, Some(MessageId::Str("req_9".to_string())));
        assert_eq!(msg.id.as_ref().unwrap().as_u64(), None);
    }

    #[test]
    fn test_error_response_into_result() {
        let msg = McpMessage::from_slice(
            br#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        assert!(msg.is_error());
        let err = msg.into_result().unwrap_err();
        match err {
            McpError::ServerError { code, message, .. } => {
                assert_eq!(code, error_codes::METHOD_NOT_FOUND);
                assert!(message.contains("Method not found"));
            }
            other => panic!("expected ServerError, got {other:?}"),
        }
    }

    #[test]
    fn test_tool_info_both_schema_spellings() {
        let camel: ToolInfo = serde_json::from_str(
            r#"{"name":"read_file","inputSchema":{"type":"object"}}"#,
        )
        .unwrap();
        let snake: ToolInfo = serde_json::from_str(
            r#"{"name":"read_file","input_schema":{"type":"object"}}"#,
        )
        .unwrap();
        assert_eq!(camel.input_schema, snake.input_schema);
        assert!(camel.input_schema.is_some());
    }

    #[test]
    fn test_initialize_params_casing() {
        let params = InitializeParams::default();
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("protocolVersion"));
        assert!(json.contains("clientInfo"));
        assert!(json.contains("gwydion"));
    }

    #[test]
    fn test_call_tool_result_text() {
        let result: CallToolResult = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"a"},{"type":"text","text":"b"}]}"#,
        )
        .unwrap();
        assert!(!result.is_error());
        assert_eq!(result.text(), Some("a\nb".to_string()));
    }

    #[test]
    fn test_call_tool_result_error_flag() {
        let result: CallToolResult = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"boom"}],"isError":true}"#,
        )
        .unwrap();
        assert!(result.is_error());
    }

    #[test]
    fn test_ping_result() {
        let pong: PingResult = serde_json::from_str(r#"{"pong":true}"#).unwrap();
        assert!(pong.pong);
    }

    #[test]
    fn test_empty_resource_and_prompt_lists() {
        let resources: ListResourcesResult = serde_json::from_str(r#"{}"#).unwrap();
        assert!(resources.resources.is_empty());
        let prompts: ListPromptsResult = serde_json::from_str(r#"{"prompts":[]}"#).unwrap();
        assert!(prompts.prompts.is_empty());
    }
}
