//! Server configuration and settings file handling.
//!
//! A [`McpServerConfig`] is the per-server snapshot consumed at server start:
//! transport selection, process/socket parameters, security policy, and
//! timeouts. [`McpSettings`] is the YAML settings root with a `servers`
//! mapping plus advisory discovery/update/namespace sections.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{McpError, Result};

/// Default per-call and connect timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Which channel a server speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Child process over stdio.
    #[default]
    Stdio,
    /// WebSocket endpoint.
    WebSocket,
}

/// Operation class a tool performs, inferred from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Read-only access.
    Read,
    /// Creates or mutates data.
    Write,
    /// Removes data.
    Delete,
    /// Runs code or commands.
    Execute,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::Execute => "execute",
        };
        write!(f, "{}", s)
    }
}

/// Per-server security policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityPolicy {
    /// Operations this server's tools may perform. Empty means all.
    pub allowed_operations: Vec<OperationKind>,
    /// If non-empty, path arguments must fall under one of these.
    pub allowed_paths: Vec<PathBuf>,
    /// Path arguments must never fall under any of these.
    pub forbidden_paths: Vec<PathBuf>,
}

impl SecurityPolicy {
    /// Whether the policy admits the given operation class.
    pub fn allows_operation(&self, op: OperationKind) -> bool {
        self.allowed_operations.is_empty() || self.allowed_operations.contains(&op)
    }

    /// Whether any path restriction is configured at all.
    pub fn restricts_paths(&self) -> bool {
        !self.allowed_paths.is_empty() || !self.forbidden_paths.is_empty()
    }
}

/// Reconnection policy for the connection health loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Seconds between health checks.
    pub check_interval_secs: u64,
    /// Backoff base; attempt n sleeps base^n seconds.
    pub base_delay_secs: u64,
    /// Reconnect attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            base_delay_secs: 2,
            max_attempts: 3,
        }
    }
}

impl ReconnectPolicy {
    /// Interval between health checks.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Exponential backoff delay for the given attempt (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.base_delay_secs.saturating_pow(attempt))
    }
}

/// Configuration for one MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    /// Unique name for this server. Filled from the settings map key.
    #[serde(skip)]
    pub name: String,
    /// Transport kind.
    pub transport: TransportKind,
    /// Command to spawn (stdio transport).
    pub command: String,
    /// Arguments to pass to the command.
    pub args: Vec<String>,
    /// Environment overrides, overlaid on the current process environment.
    pub environment: HashMap<String, String>,
    /// Endpoint URL (websocket transport).
    pub url: Option<String>,
    /// Request headers (websocket transport).
    pub headers: HashMap<String, String>,
    /// Per-call and connect timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Security policy for this server's tools.
    pub security: SecurityPolicy,
    /// Reconnection policy.
    pub reconnect: ReconnectPolicy,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            transport: TransportKind::Stdio,
            command: String::new(),
            args: Vec::new(),
            environment: HashMap::new(),
            url: None,
            headers: HashMap::new(),
            timeout_secs: None,
            security: SecurityPolicy::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl McpServerConfig {
    /// Create a stdio server config.
    pub fn stdio(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    /// Create a websocket server config.
    pub fn websocket(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::WebSocket,
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Replace the argument list.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an environment override.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Add a request header (websocket transport).
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs());
        self
    }

    /// Set the security policy.
    pub fn with_security(mut self, security: SecurityPolicy) -> Self {
        self.security = security;
        self
    }

    /// Set the reconnect policy.
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// The effective per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Check if this is a stdio config.
    pub fn is_stdio(&self) -> bool {
        self.transport == TransportKind::Stdio
    }

    /// Check if this is a websocket config.
    pub fn is_websocket(&self) -> bool {
        self.transport == TransportKind::WebSocket
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings file
// ─────────────────────────────────────────────────────────────────────────────

/// Auto-discovery settings (advisory).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Whether periodic discovery runs.
    pub enabled: bool,
    /// Seconds between discovery cycles.
    pub interval_secs: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 60,
        }
    }
}

/// How descriptor updates are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Apply each update as it is observed.
    #[default]
    Immediate,
    /// Batch updates under a concurrency limit.
    Batched,
}

/// Dynamic update settings (advisory).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSettings {
    /// Update application mode.
    pub mode: UpdateMode,
    /// Concurrency limit for batched updates.
    pub max_concurrent: usize,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            mode: UpdateMode::Immediate,
            max_concurrent: 4,
        }
    }
}

/// Name-collision handling, as written in the settings file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictMode {
    /// Append server-derived suffixes until unique.
    #[default]
    Suffix,
    /// Fail the registration.
    Reject,
    /// Evict the incumbent.
    Replace,
}

/// Namespace settings (advisory).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceSettings {
    /// Namespace that MCP tools register under by default.
    pub default_namespace: String,
    /// Maximum namespace tree depth.
    pub max_depth: usize,
    /// Collision handling.
    pub conflict: ConflictMode,
    /// Whether short aliases are created.
    pub aliases: bool,
}

impl Default for NamespaceSettings {
    fn default() -> Self {
        Self {
            default_namespace: "mcp".to_string(),
            max_depth: 4,
            conflict: ConflictMode::Suffix,
            aliases: true,
        }
    }
}

/// Root of the MCP settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpSettings {
    /// Servers keyed by name.
    pub servers: HashMap<String, McpServerConfig>,
    /// Auto-discovery section.
    pub discovery: DiscoverySettings,
    /// Dynamic update section.
    pub updates: UpdateSettings,
    /// Namespace section.
    pub namespace: NamespaceSettings,
}

impl McpSettings {
    /// Parse settings from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let mut settings: Self = serde_yaml::from_str(text)
            .map_err(|e| McpError::config(format!("invalid settings: {}", e)))?;
        for (name, server) in settings.servers.iter_mut() {
            server.name = name.clone();
        }
        Ok(settings)
    }

    /// Load settings from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            McpError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    /// Server configs in name order.
    pub fn server_configs(&self) -> Vec<McpServerConfig> {
        let mut configs: Vec<_> = self.servers.values().cloned().collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        configs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdio_config_builder() {
        let config = McpServerConfig::stdio("sqlite", "mcp-server-sqlite")
            .with_arg("--db")
            .with_arg("/path/to/db")
            .with_env_var("DEBUG", "1")
            .with_timeout(Duration::from_secs(10));

        assert_eq!(config.name, "sqlite");
        assert_eq!(config.command, "mcp-server-sqlite");
        assert_eq!(config.args, vec!["--db", "/path/to/db"]);
        assert_eq!(config.environment.get("DEBUG"), Some(&"1".to_string()));
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(config.is_stdio());
        assert!(!config.is_websocket());
    }

    #[test]
    fn test_websocket_config_builder() {
        let config = McpServerConfig::websocket("remote", "wss://mcp.example.com/ws")
            .with_header("Authorization", "Bearer token123");

        assert_eq!(config.url.as_deref(), Some("wss://mcp.example.com/ws"));
        assert!(config.is_websocket());
        assert_eq!(
            config.headers.get("Authorization"),
            Some(&"Bearer token123".to_string())
        );
    }

    #[test]
    fn test_default_timeout() {
        let config = McpServerConfig::stdio("s", "cmd");
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_security_policy_operations() {
        let open = SecurityPolicy::default();
        assert!(open.allows_operation(OperationKind::Delete));
        assert!(!open.restricts_paths());

        let restricted = SecurityPolicy {
            allowed_operations: vec![OperationKind::Read],
            forbidden_paths: vec![PathBuf::from("/etc")],
            ..Default::default()
        };
        assert!(restricted.allows_operation(OperationKind::Read));
        assert!(!restricted.allows_operation(OperationKind::Write));
        assert!(restricted.restricts_paths());
    }

    #[test]
    fn test_reconnect_backoff() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(8));
        assert_eq!(policy.check_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_settings_from_yaml() {
        let yaml = r#"
servers:
  files:
    transport: stdio
    command: mcp-server-files
    args: ["--root", "/srv"]
    environment:
      LOG_LEVEL: debug
    timeout_secs: 15
    security:
      allowed_operations: [read, write]
      forbidden_paths: ["/etc"]
  remote:
    transport: websocket
    url: wss://tools.example.com/mcp
    headers:
      X-Api-Key: secret
discovery:
  enabled: true
  interval_secs: 120
namespace:
  default_namespace: tools
  conflict: reject
"#;
        let settings = McpSettings::from_yaml(yaml).unwrap();
        assert_eq!(settings.servers.len(), 2);

        let files = &settings.servers["files"];
        assert_eq!(files.name, "files");
        assert!(files.is_stdio());
        assert_eq!(files.timeout(), Duration::from_secs(15));
        assert!(files.security.allows_operation(OperationKind::Read));
        assert!(!files.security.allows_operation(OperationKind::Delete));

        let remote = &settings.servers["remote"];
        assert!(remote.is_websocket());
        assert_eq!(remote.headers.get("X-Api-Key"), Some(&"secret".to_string()));

        assert!(settings.discovery.enabled);
        assert_eq!(settings.discovery.interval_secs, 120);
        assert_eq!(settings.namespace.default_namespace, "tools");
        assert_eq!(settings.namespace.conflict, ConflictMode::Reject);
    }

    #[test]
    fn test_settings_empty_yaml() {
        let settings = McpSettings::from_yaml("{}").unwrap();
        assert!(settings.servers.is_empty());
        assert!(!settings.discovery.enabled);
        assert_eq!(settings.namespace.default_namespace, "mcp");
    }

    #[test]
    fn test_server_configs_sorted() {
        let yaml = r#"
servers:
  zeta: { command: z }
  alpha: { command: a }
"#;
        let settings = McpSettings::from_yaml(yaml).unwrap();
        let configs = settings.server_configs();
        assert_eq!(configs[0].name, "alpha");
        assert_eq!(configs[1].name, "zeta");
    }
}
