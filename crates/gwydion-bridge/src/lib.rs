//! Runtime-isolated MCP integration facade for Gwydion.
//!
//! Protocol waiters must live and complete on one runtime. Host
//! applications, however, call tools from wherever they happen to run: an
//! HTTP server's multi-threaded runtime, a UI thread, a test harness. This
//! crate keeps the two worlds apart:
//!
//! - [`McpWorker`] owns a dedicated single-threaded runtime on its own OS
//!   thread; every transport, protocol, and manager future runs there.
//! - [`McpIntegration`] is the facade the agent calls: initialize from a
//!   settings file, list/search/inspect tools, execute with streamed
//!   results, or collect a whole call with [`McpIntegration::call_tool_safe`]
//!   from any runtime.
//!
//! ```rust,ignore
//! use gwydion_bridge::McpIntegration;
//!
//! let integration = McpIntegration::new();
//! integration.initialize(Some(Path::new("mcp.yaml"))).await;
//!
//! for name in integration.list_tools(true, true)? {
//!     println!("tool: {name}");
//! }
//!
//! let outcome = integration.call_tool_safe("mcp:echo", json!({"message": "hi"})).await;
//! println!("{:?}", outcome.content);
//!
//! integration.shutdown().await;
//! ```

pub mod error;
pub mod facade;
pub mod worker;

// Re-export main types
pub use error::{BridgeError, Result};
pub use facade::{DEFAULT_BRIDGE_TIMEOUT, McpIntegration, SafeCallOutcome};
pub use worker::McpWorker;
