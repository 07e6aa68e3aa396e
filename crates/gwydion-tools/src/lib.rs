//! Unified tool registry for Gwydion.
//!
//! This crate turns the raw MCP surface of `gwydion-mcp` into the tool
//! catalog an agent actually calls: every tool, native or MCP-sourced, gets
//! a globally unique namespaced name, a compiled input validator, and a
//! permission gate, and executes as a lazy stream of results.
//!
//! A tool call flows through [`ToolRegistry::execute_tool`]:
//!
//! 1. resolve the name (full names and aliases both work)
//! 2. validate arguments against the tool's advertised schema, locally
//! 3. check caller policy and the owning server's security policy
//! 4. execute, streaming progress and a terminal success/error result
//!
//! Discovery keeps the catalog live: [`registry::ToolRegistry::sync_mcp_tools`]
//! diffs every server's advertised tools against the current records, and
//! [`discovery::AutoDiscovery`] runs that on an interval.

pub mod discovery;
pub mod error;
pub mod namespace;
pub mod permissions;
pub mod registry;
pub mod result;
pub mod schema;
pub mod tool;
pub mod wrapper;

// Re-export main types
pub use discovery::{AutoDiscovery, DiscoveryCallback, DiscoveryEvent};
pub use error::{Result, ToolError};
pub use namespace::{ConflictRecord, NamespaceManager, ToolRecord};
pub use permissions::{
    AllowAllPermissions, DenyListPermissions, OperationClassifier, PermissionManager,
    check_security_policy,
};
pub use registry::{
    DiscoveryReport, RegistrationFailure, SearchMatch, ToolInfoReport, ToolRegistry, ToolStats,
};
pub use result::{ResultStream, ToolResult, ToolResultKind, single};
pub use schema::{FieldSpec, FieldType, SchemaValidator, ValidationError};
pub use tool::{Tool, ToolContext, ToolKind};
pub use wrapper::McpToolWrapper;
