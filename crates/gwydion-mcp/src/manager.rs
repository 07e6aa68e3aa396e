//! Multi-server lifecycle management.
//!
//! The [`McpServerManager`] owns one supervised connection per configured
//! server, performs the MCP handshake, and exposes a routed call interface.
//! Server state is explicit: a server admits tool calls only after
//! `initialize` + `notifications/initialized` have completed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::{McpServerConfig, McpSettings};
use crate::connection::McpConnection;
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, ClientInfo, InitializeParams, InitializeResult,
    ListPromptsResult, ListResourcesResult, ListToolsResult, McpProtocol, PingResult, PromptInfo,
    ResourceInfo, ServerInfo, ToolInfo, methods,
};
use crate::transport::McpTransport;

/// Lifecycle state of a managed server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// No channel established.
    Disconnected,
    /// Channel established, handshake not yet complete.
    Connected,
    /// Handshake complete; tool calls admitted.
    Initialized,
    /// Connect or handshake failed.
    Unhealthy,
}

/// Server-level liveness summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Responding to pings.
    Healthy,
    /// Initialized but not responding cleanly.
    Degraded,
    /// Connect or handshake failed, or torn down.
    Unhealthy,
    /// Not known to the manager.
    Unknown,
}

/// Point-in-time health report for one server.
#[derive(Debug, Clone)]
pub struct ServerHealth {
    /// Server name.
    pub server: String,
    /// Liveness classification.
    pub status: HealthStatus,
    /// When the check ran.
    pub checked_at: DateTime<Utc>,
    /// Optional diagnostic.
    pub detail: Option<String>,
}

struct ManagedServer {
    protocol: Arc<McpProtocol>,
    connection: McpConnection,
    state: parking_lot::Mutex<ServerState>,
    server_info: parking_lot::Mutex<Option<ServerInfo>>,
}

impl ManagedServer {
    fn state(&self) -> ServerState {
        *self.state.lock()
    }

    async fn teardown(&self) {
        self.protocol.shutdown().await;
        self.connection.disconnect().await;
        *self.state.lock() = ServerState::Disconnected;
    }
}

/// Manager for a fleet of MCP server connections.
pub struct McpServerManager {
    configs: parking_lot::Mutex<HashMap<String, McpServerConfig>>,
    servers: tokio::sync::RwLock<HashMap<String, Arc<ManagedServer>>>,
    client_info: ClientInfo,
}

impl Default for McpServerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl McpServerManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            configs: parking_lot::Mutex::new(HashMap::new()),
            servers: tokio::sync::RwLock::new(HashMap::new()),
            client_info: ClientInfo::default(),
        }
    }

    /// Create a manager pre-populated from settings.
    pub fn with_settings(settings: &McpSettings) -> Self {
        let manager = Self::new();
        for config in settings.server_configs() {
            manager.add_server(config);
        }
        manager
    }

    /// Add a server configuration. Connecting happens at [`start`](Self::start).
    pub fn add_server(&self, config: McpServerConfig) {
        tracing::debug!(server = %config.name, "adding MCP server configuration");
        self.configs.lock().insert(config.name.clone(), config);
    }

    /// Remove a server, disconnecting it first if active.
    pub async fn remove_server(&self, name: &str) -> bool {
        if let Some(server) = self.servers.write().await.remove(name) {
            tracing::info!(server = %name, "disconnecting MCP server");
            server.teardown().await;
        }
        self.configs.lock().remove(name).is_some()
    }

    /// Names of all configured servers, sorted.
    pub fn list_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// The configuration for a server, if known.
    pub fn server_config(&self, name: &str) -> Option<McpServerConfig> {
        self.configs.lock().get(name).cloned()
    }

    /// Lifecycle state for a server, if active.
    pub async fn server_state(&self, name: &str) -> Option<ServerState> {
        self.servers.read().await.get(name).map(|s| s.state())
    }

    /// Server info captured at handshake, if any.
    pub async fn server_info(&self, name: &str) -> Option<ServerInfo> {
        let servers = self.servers.read().await;
        servers.get(name).and_then(|s| s.server_info.lock().clone())
    }

    /// Connect and initialize every configured server.
    ///
    /// Failures on individual servers are logged and leave that server
    /// unhealthy; they never abort the overall start. Returns the number of
    /// servers that reached the initialized state.
    pub async fn start(&self) -> usize {
        let configs: Vec<McpServerConfig> = {
            let guard = self.configs.lock();
            let mut configs: Vec<_> = guard.values().cloned().collect();
            configs.sort_by(|a, b| a.name.cmp(&b.name));
            configs
        };

        let mut initialized = 0;
        for config in configs {
            let name = config.name.clone();
            if let Some(state) = self.server_state(&name).await
                && state == ServerState::Initialized
            {
                tracing::debug!(server = %name, "server already initialized, skipping");
                initialized += 1;
                continue;
            }
            match self.start_server(config).await {
                Ok(()) => {
                    initialized += 1;
                    tracing::info!(server = %name, "MCP server initialized");
                }
                Err(e) => {
                    tracing::error!(server = %name, error = %e, "failed to start MCP server");
                }
            }
        }

        tracing::info!(
            initialized,
            total = self.configs.lock().len(),
            "MCP server startup complete"
        );
        initialized
    }

    /// Start one server by config: transport, connection, handshake.
    async fn start_server(&self, config: McpServerConfig) -> Result<()> {
        let name = config.name.clone();
        let transport = McpTransport::from_config(&config)?;
        let protocol =
            Arc::new(McpProtocol::new(Arc::clone(&transport)).with_call_timeout(config.timeout()));
        let connection = McpConnection::new(Arc::clone(&transport))
            .with_timeouts(config.timeout(), config.timeout())
            .with_policy(config.reconnect.clone());

        let server = Arc::new(ManagedServer {
            protocol,
            connection,
            state: parking_lot::Mutex::new(ServerState::Disconnected),
            server_info: parking_lot::Mutex::new(None),
        });

        self.servers
            .write()
            .await
            .insert(name.clone(), Arc::clone(&server));

        if let Err(e) = server.connection.connect().await {
            *server.state.lock() = ServerState::Unhealthy;
            return Err(e);
        }
        *server.state.lock() = ServerState::Connected;

        match self.handshake(&server).await {
            Ok(info) => {
                tracing::info!(
                    server = %name,
                    remote = %info.name,
                    version = %info.version,
                    "MCP handshake complete"
                );
                *server.server_info.lock() = Some(info);
                *server.state.lock() = ServerState::Initialized;
                Ok(())
            }
            Err(e) => {
                server.protocol.shutdown().await;
                server.connection.disconnect().await;
                *server.state.lock() = ServerState::Unhealthy;
                Err(e)
            }
        }
    }

    /// The initialize request/response plus the initialized notification.
    async fn handshake(&self, server: &ManagedServer) -> Result<ServerInfo> {
        let params = InitializeParams {
            client_info: self.client_info.clone(),
            ..Default::default()
        };
        let result = server
            .protocol
            .call_method(methods::INITIALIZE, Some(serde_json::to_value(&params)?))
            .await?;
        let init: InitializeResult = serde_json::from_value(result)?;
        server
            .protocol
            .send_notification(methods::NOTIFICATIONS_INITIALIZED, None)
            .await?;
        Ok(init.server_info)
    }

    /// Disconnect every server. Configurations are preserved.
    pub async fn stop(&self) {
        let servers: Vec<Arc<ManagedServer>> =
            self.servers.write().await.drain().map(|(_, s)| s).collect();
        tracing::info!(server_count = servers.len(), "stopping all MCP servers");
        for server in servers {
            server.teardown().await;
        }
    }

    /// Look up an initialized server or explain why it cannot take calls.
    async fn initialized(&self, name: &str) -> Result<Arc<ManagedServer>> {
        let servers = self.servers.read().await;
        let server = servers
            .get(name)
            .ok_or_else(|| McpError::ServerNotFound(name.to_string()))?;
        match server.state() {
            ServerState::Initialized => Ok(Arc::clone(server)),
            ServerState::Connected => Err(McpError::NotInitialized),
            _ => Err(McpError::ServerUnhealthy(name.to_string())),
        }
    }

    /// List tools advertised by one server.
    pub async fn list_tools(&self, name: &str) -> Result<Vec<ToolInfo>> {
        let server = self.initialized(name).await?;
        let result = server.protocol.call_method(methods::TOOLS_LIST, None).await?;
        let list: ListToolsResult = serde_json::from_value(result)?;
        tracing::debug!(server = %name, tool_count = list.tools.len(), "listed tools");
        Ok(list.tools)
    }

    /// List resources advertised by one server.
    pub async fn list_resources(&self, name: &str) -> Result<Vec<ResourceInfo>> {
        let server = self.initialized(name).await?;
        let result = server
            .protocol
            .call_method(methods::RESOURCES_LIST, None)
            .await?;
        let list: ListResourcesResult = serde_json::from_value(result)?;
        Ok(list.resources)
    }

    /// List prompt templates advertised by one server.
    pub async fn list_prompts(&self, name: &str) -> Result<Vec<PromptInfo>> {
        let server = self.initialized(name).await?;
        let result = server
            .protocol
            .call_method(methods::PROMPTS_LIST, None)
            .await?;
        let list: ListPromptsResult = serde_json::from_value(result)?;
        Ok(list.prompts)
    }

    /// Enumerate tools from every initialized server concurrently.
    ///
    /// Per-server failures are logged and that server is omitted; one bad
    /// server never hides the rest.
    pub async fn get_all_tools(&self) -> HashMap<String, Vec<ToolInfo>> {
        let names: Vec<String> = {
            let servers = self.servers.read().await;
            servers
                .iter()
                .filter(|(_, s)| s.state() == ServerState::Initialized)
                .map(|(name, _)| name.clone())
                .collect()
        };

        let fetches = names.into_iter().map(|name| async move {
            let tools = self.list_tools(&name).await;
            (name, tools)
        });

        let mut all = HashMap::new();
        for (name, tools) in futures::future::join_all(fetches).await {
            match tools {
                Ok(tools) => {
                    all.insert(name, tools);
                }
                Err(e) => {
                    tracing::error!(server = %name, error = %e, "failed to list tools");
                }
            }
        }
        all
    }

    /// Invoke a tool on the named server.
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool: &str,
        arguments: Option<Value>,
    ) -> Result<CallToolResult> {
        let server = self.initialized(server_name).await?;
        let params = CallToolParams {
            name: tool.to_string(),
            arguments,
        };
        let result = server
            .protocol
            .call_method(methods::TOOLS_CALL, Some(serde_json::to_value(&params)?))
            .await?;
        let call: CallToolResult = serde_json::from_value(result)?;
        if call.is_error() {
            tracing::warn!(server = %server_name, tool = %tool, "tool call returned error");
        } else {
            tracing::debug!(server = %server_name, tool = %tool, "tool call succeeded");
        }
        Ok(call)
    }

    /// Probe one server with a ping and report its health.
    pub async fn get_server_health(&self, name: &str) -> ServerHealth {
        let checked_at = Utc::now();
        if self.server_config(name).is_none() {
            return ServerHealth {
                server: name.to_string(),
                status: HealthStatus::Unknown,
                checked_at,
                detail: Some("server not configured".to_string()),
            };
        }

        let server = match self.initialized(name).await {
            Ok(server) => server,
            Err(e) => {
                return ServerHealth {
                    server: name.to_string(),
                    status: HealthStatus::Unhealthy,
                    checked_at,
                    detail: Some(e.to_string()),
                };
            }
        };

        match server.protocol.call_method(methods::PING, None).await {
            Ok(value) => {
                let pong: PingResult = serde_json::from_value(value).unwrap_or(PingResult { pong: false });
                if pong.pong {
                    ServerHealth {
                        server: name.to_string(),
                        status: HealthStatus::Healthy,
                        checked_at,
                        detail: None,
                    }
                } else {
                    ServerHealth {
                        server: name.to_string(),
                        status: HealthStatus::Degraded,
                        checked_at,
                        detail: Some("ping returned no pong".to_string()),
                    }
                }
            }
            Err(e) => ServerHealth {
                server: name.to_string(),
                status: HealthStatus::Degraded,
                checked_at,
                detail: Some(e.to_string()),
            },
        }
    }

    /// Number of configured servers.
    pub fn config_count(&self) -> usize {
        self.configs.lock().len()
    }

    /// Number of servers currently in the initialized state.
    pub async fn initialized_count(&self) -> usize {
        self.servers
            .read()
            .await
            .values()
            .filter(|s| s.state() == ServerState::Initialized)
            .count()
    }
}

impl std::fmt::Debug for McpServerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServerManager")
            .field("configured", &self.list_servers())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_manager_empty() {
        let manager = McpServerManager::new();
        assert_eq!(manager.config_count(), 0);
        assert_eq!(manager.initialized_count().await, 0);
        assert!(manager.list_servers().is_empty());
    }

    #[tokio::test]
    async fn test_add_and_remove_server() {
        let manager = McpServerManager::new();
        manager.add_server(McpServerConfig::stdio("test", "cmd"));
        assert_eq!(manager.config_count(), 1);
        assert!(manager.server_config("test").is_some());

        assert!(manager.remove_server("test").await);
        assert!(manager.server_config("test").is_none());
        assert!(!manager.remove_server("test").await);
    }

    #[tokio::test]
    async fn test_list_servers_sorted() {
        let manager = McpServerManager::new();
        manager.add_server(McpServerConfig::stdio("zeta", "cmd"));
        manager.add_server(McpServerConfig::stdio("alpha", "cmd"));
        assert_eq!(manager.list_servers(), vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_start_with_invalid_command_marks_unhealthy() {
        let manager = McpServerManager::new();
        manager.add_server(McpServerConfig::stdio("bad", "nonexistent-command-12345"));

        let initialized = manager.start().await;
        assert_eq!(initialized, 0);
        assert_eq!(
            manager.server_state("bad").await,
            Some(ServerState::Unhealthy)
        );

        let health = manager.get_server_health("bad").await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert!(health.detail.is_some());
    }

    #[tokio::test]
    async fn test_call_tool_unknown_server() {
        let manager = McpServerManager::new();
        let result = manager.call_tool("missing", "echo", None).await;
        assert!(matches!(result, Err(McpError::ServerNotFound(_))));
    }

    #[tokio::test]
    async fn test_health_unknown_for_unconfigured() {
        let manager = McpServerManager::new();
        let health = manager.get_server_health("ghost").await;
        assert_eq!(health.status, HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn test_with_settings_populates_configs() {
        let settings = McpSettings::from_yaml(
            r#"
servers:
  one: { command: a }
  two: { command: b }
"#,
        )
        .unwrap();
        let manager = McpServerManager::with_settings(&settings);
        assert_eq!(manager.config_count(), 2);
        assert_eq!(manager.list_servers(), vec!["one", "two"]);
    }
}
