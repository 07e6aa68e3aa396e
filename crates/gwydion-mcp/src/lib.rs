//! MCP (Model Context Protocol) client core for Gwydion.
//!
//! This crate speaks the MCP wire protocol (a JSON-RPC 2.0 dialect) to a
//! fleet of external tool-providing servers and supervises their lifecycles.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpServerManager                                           │
//! │  - named servers, handshake, routed tools/call              │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpConnection                                              │
//! │  - connect deadline, health loop, backoff reconnect         │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpProtocol                                                │
//! │  - request ids, pending table, background reader            │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpTransport                                               │
//! │  - stdio (newline-framed) or WebSocket (text frames)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The protocol flow per server is:
//! 1. Transport connect (spawn process / open socket)
//! 2. `initialize` request, capabilities exchanged
//! 3. `notifications/initialized` notification
//! 4. `tools/list`, `tools/call`, `ping`, ...
//!
//! Any number of calls may be in flight on one protocol at a time; responses
//! are matched to callers by request id, never by arrival order.

pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod transport;

// Re-export main types
pub use config::{
    ConflictMode, DiscoverySettings, McpServerConfig, McpSettings, NamespaceSettings,
    OperationKind, ReconnectPolicy, SecurityPolicy, TransportKind, UpdateMode, UpdateSettings,
};
pub use connection::McpConnection;
pub use error::{McpError, Result};
pub use manager::{HealthStatus, McpServerManager, ServerHealth, ServerState};
pub use protocol::{
    CallToolParams, CallToolResult, ClientCapabilities, ClientInfo, InitializeParams,
    InitializeResult, ListPromptsResult, ListResourcesResult, ListToolsResult, McpMessage,
    McpProtocol, MessageId, PingResult, PromptInfo, ProtocolState, ResourceInfo, RpcError,
    ServerCapabilities, ServerInfo, ToolContent, ToolInfo, error_codes, methods,
};
pub use transport::{McpTransport, StdioTransport, WsTransport};
