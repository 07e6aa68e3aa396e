//! The integration facade.
//!
//! [`McpIntegration`] is what the agent calls. It composes the server
//! manager, the tool registry, auto-discovery, and the dedicated worker
//! runtime behind one surface: initialize from a settings file, list and
//! search tools, execute with streaming results, or make a
//! runtime-safe collected call from any foreign runtime.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;

use gwydion_mcp::{McpServerManager, McpSettings};
use gwydion_tools::{
    AutoDiscovery, ResultStream, SearchMatch, ToolInfoReport, ToolRegistry, ToolResult,
    ToolResultKind, single,
};

use crate::error::{BridgeError, Result};
use crate::worker::McpWorker;

/// Default deadline for bridged collected calls.
pub const DEFAULT_BRIDGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadline for startup (connect + handshake + first discovery).
const STARTUP_TIMEOUT: Duration = Duration::from_secs(120);

/// Plain outcome of a collected tool call, safe to carry across runtimes.
#[derive(Debug, Clone)]
pub struct SafeCallOutcome {
    /// Whether the execution ended in success.
    pub success: bool,
    /// Combined output content, when successful.
    pub content: Option<String>,
    /// Error diagnostic, when failed.
    pub error: Option<String>,
    /// Metadata from the terminal result plus bridge bookkeeping.
    pub metadata: HashMap<String, Value>,
}

impl SafeCallOutcome {
    /// Collapse a collected result sequence into one outcome.
    ///
    /// The terminal result decides success; success output combines every
    /// success/output content in order.
    pub fn from_results(tool_name: &str, results: Vec<ToolResult>) -> Self {
        let Some(terminal) = results.last() else {
            return Self {
                success: false,
                content: None,
                error: Some("no results returned from tool execution".to_string()),
                metadata: HashMap::from([(
                    "tool_name".to_string(),
                    Value::String(tool_name.to_string()),
                )]),
            };
        };

        let mut metadata = terminal.metadata.clone();
        metadata.insert(
            "results_count".to_string(),
            Value::from(results.len() as u64),
        );

        if terminal.is_error() {
            Self {
                success: false,
                content: None,
                error: Some(terminal.content.clone()),
                metadata,
            }
        } else {
            let combined: Vec<&str> = results
                .iter()
                .filter(|r| {
                    matches!(r.kind, ToolResultKind::Success | ToolResultKind::Output)
                        && !r.content.is_empty()
                })
                .map(|r| r.content.as_str())
                .collect();
            Self {
                success: true,
                content: Some(combined.join("\n")),
                error: None,
                metadata,
            }
        }
    }

    /// A failed outcome with the given diagnostic.
    fn failure(tool_name: &str, error: impl Into<String>, error_type: &str) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(error.into()),
            metadata: HashMap::from([
                ("tool_name".to_string(), Value::String(tool_name.to_string())),
                ("error_type".to_string(), Value::String(error_type.to_string())),
            ]),
        }
    }

    /// Convert into a terminal [`ToolResult`].
    pub fn into_tool_result(self, tool_name: &str, execution_id: &str) -> ToolResult {
        let mut result = if self.success {
            ToolResult::success(self.content.unwrap_or_default(), tool_name, execution_id)
        } else {
            ToolResult::error(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
                tool_name,
                execution_id,
            )
        };
        result.metadata.extend(self.metadata);
        result
    }
}

struct IntegrationState {
    manager: Arc<McpServerManager>,
    registry: Arc<ToolRegistry>,
    discovery: Arc<AutoDiscovery>,
}

/// The unified entry point to MCP tooling.
pub struct McpIntegration {
    worker: Arc<McpWorker>,
    state: parking_lot::Mutex<Option<Arc<IntegrationState>>>,
    call_timeout: Duration,
}

impl Default for McpIntegration {
    fn default() -> Self {
        Self::new()
    }
}

impl McpIntegration {
    /// Create an uninitialized integration.
    pub fn new() -> Self {
        Self {
            worker: Arc::new(McpWorker::new()),
            state: parking_lot::Mutex::new(None),
            call_timeout: DEFAULT_BRIDGE_TIMEOUT,
        }
    }

    /// Set the bridged-call deadline.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Load settings, start every configured server on the worker runtime,
    /// and run the first discovery cycle.
    ///
    /// Idempotent: a second call on an initialized integration is a no-op
    /// returning true. Failures are logged and yield false.
    pub async fn initialize(&self, config_path: Option<&Path>) -> bool {
        if self.state.lock().is_some() {
            return true;
        }

        let settings = match config_path {
            Some(path) => match McpSettings::load(path) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::error!(error = %e, "failed to load MCP settings");
                    return false;
                }
            },
            None => McpSettings::default(),
        };

        let manager = Arc::new(McpServerManager::with_settings(&settings));
        let registry = Arc::new(ToolRegistry::with_settings(
            Arc::clone(&manager),
            &settings,
        ));

        let startup = {
            let manager = Arc::clone(&manager);
            let registry = Arc::clone(&registry);
            self.worker
                .run(
                    async move {
                        let servers = manager.start().await;
                        let report = registry.sync_mcp_tools().await;
                        (servers, report)
                    },
                    STARTUP_TIMEOUT,
                )
                .await
        };

        let (servers, report) = match startup {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "MCP integration startup failed");
                return false;
            }
        };
        tracing::info!(
            servers,
            tools = report.added.len(),
            failed = report.failed.len(),
            "MCP integration initialized"
        );

        let discovery = Arc::new(AutoDiscovery::new(
            Arc::clone(&registry),
            Duration::from_secs(settings.discovery.interval_secs),
        ));
        if settings.discovery.enabled {
            let discovery = Arc::clone(&discovery);
            let started = self
                .worker
                .run(
                    async move {
                        discovery.start();
                    },
                    Duration::from_secs(5),
                )
                .await;
            if let Err(e) = started {
                tracing::warn!(error = %e, "auto-discovery could not be started");
            }
        }

        *self.state.lock() = Some(Arc::new(IntegrationState {
            manager,
            registry,
            discovery,
        }));
        true
    }

    fn state(&self) -> Result<Arc<IntegrationState>> {
        self.state
            .lock()
            .as_ref()
            .cloned()
            .ok_or(BridgeError::NotInitialized)
    }

    /// Whether initialization has completed.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Full names of registered tools.
    pub fn list_tools(&self, include_native: bool, include_mcp: bool) -> Result<Vec<String>> {
        Ok(self.state()?.registry.list_tools(include_native, include_mcp))
    }

    /// Everything known about one tool.
    pub fn get_tool_info(&self, name: &str) -> Result<Option<ToolInfoReport>> {
        Ok(self.state()?.registry.get_tool_info(name))
    }

    /// Search tool names and descriptions.
    pub fn search_tools(&self, query: &str, fuzzy: bool) -> Result<Vec<SearchMatch>> {
        Ok(self.state()?.registry.search_tools(query, fuzzy))
    }

    /// The registry, for callers that need direct access.
    pub fn registry(&self) -> Result<Arc<ToolRegistry>> {
        Ok(Arc::clone(&self.state()?.registry))
    }

    /// Execute a tool on the worker runtime, streaming results back to the
    /// caller's runtime as they arrive.
    pub fn execute_tool(&self, name: &str, arguments: Value) -> ResultStream {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let state = match self.state() {
            Ok(state) => state,
            Err(e) => {
                return single(
                    ToolResult::error(e.to_string(), name, &execution_id)
                        .with_metadata("error_type", "not_initialized"),
                );
            }
        };
        let handle = match self.worker.handle() {
            Ok(handle) => handle,
            Err(e) => {
                return single(
                    ToolResult::error(e.to_string(), name, &execution_id)
                        .with_metadata("error_type", "worker_unavailable"),
                );
            }
        };

        let registry = Arc::clone(&state.registry);
        let name = name.to_string();
        let (tx, mut rx) = tokio::sync::mpsc::channel::<ToolResult>(16);
        handle.spawn(async move {
            let mut stream = registry.execute_tool(&name, arguments);
            while let Some(result) = stream.next().await {
                if tx.send(result).await.is_err() {
                    break;
                }
            }
        });

        Box::pin(async_stream::stream! {
            while let Some(result) = rx.recv().await {
                yield result;
            }
        })
    }

    /// Execute a tool and collect the whole sequence into one outcome.
    ///
    /// Safe to call from any runtime; the work runs on the worker runtime
    /// under the bridged-call deadline.
    pub async fn call_tool_safe(&self, name: &str, arguments: Value) -> SafeCallOutcome {
        let state = match self.state() {
            Ok(state) => state,
            Err(e) => return SafeCallOutcome::failure(name, e.to_string(), "not_initialized"),
        };

        let registry = Arc::clone(&state.registry);
        let tool_name = name.to_string();
        let collected = self
            .worker
            .run(
                async move {
                    let mut stream = registry.execute_tool(&tool_name, arguments);
                    let mut results = Vec::new();
                    while let Some(result) = stream.next().await {
                        results.push(result);
                    }
                    results
                },
                self.call_timeout,
            )
            .await;

        match collected {
            Ok(results) => SafeCallOutcome::from_results(name, results),
            Err(BridgeError::Timeout(after)) => SafeCallOutcome::failure(
                name,
                format!("Tool call timeout after {:?}: {}", after, name),
                "timeout",
            ),
            Err(e) => SafeCallOutcome::failure(name, e.to_string(), "bridge_error"),
        }
    }

    /// Run one discovery cycle now; returns the number of registered MCP
    /// tools afterwards.
    pub async fn refresh_tools(&self) -> Result<usize> {
        let state = self.state()?;
        let registry = Arc::clone(&state.registry);
        self.worker
            .run(
                async move {
                    registry.sync_mcp_tools().await;
                    registry.list_tools(false, true).len()
                },
                STARTUP_TIMEOUT,
            )
            .await
    }

    /// Stop discovery, disconnect every server, and stop the worker.
    pub async fn shutdown(&self) {
        let state = self.state.lock().take();
        if let Some(state) = state {
            state.discovery.stop();
            let manager = Arc::clone(&state.manager);
            let stopped = self
                .worker
                .run(async move { manager.stop().await }, Duration::from_secs(30))
                .await;
            if let Err(e) = stopped {
                tracing::warn!(error = %e, "server shutdown on worker failed");
            }
        }
        self.worker.shutdown();
    }
}
