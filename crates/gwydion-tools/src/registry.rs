//! The unified tool registry.
//!
//! One permission-gated, schema-validated view over native tools and
//! MCP-sourced tools, addressed by globally unique full names. The registry
//! is also where discovery lands: `sync_mcp_tools` diffs the advertised
//! tool sets against the current records and registers, unregisters, or
//! re-registers accordingly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;

use gwydion_mcp::{McpServerManager, McpSettings, ToolInfo, UpdateMode, UpdateSettings};

use crate::namespace::NamespaceManager;
use crate::permissions::{AllowAllPermissions, OperationClassifier, PermissionManager};
use crate::result::{ResultStream, ToolResult};
use crate::tool::{Tool, ToolContext, ToolKind};
use crate::wrapper::McpToolWrapper;

/// Cumulative execution bookkeeping for one tool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolStats {
    /// Completed executions.
    pub executions: u64,
    /// Total wall-clock time across executions, in milliseconds.
    pub total_duration_ms: u64,
    /// When the tool last ran.
    pub last_executed: Option<DateTime<Utc>>,
}

impl ToolStats {
    /// Mean execution time in milliseconds.
    pub fn average_duration_ms(&self) -> f64 {
        if self.executions == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.executions as f64
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    /// Full tool name.
    pub full_name: String,
    /// Match score, higher is better.
    pub score: f64,
    /// Tool description.
    pub description: String,
}

/// Everything the registry knows about one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfoReport {
    /// Full tool name.
    pub name: String,
    /// Native or MCP.
    pub kind: ToolKind,
    /// Description.
    pub description: String,
    /// Originating server (MCP tools).
    pub server: Option<String>,
    /// Owning namespace (MCP tools).
    pub namespace: Option<String>,
    /// Aliases resolving to this tool.
    pub aliases: Vec<String>,
    /// Advertised input schema.
    pub schema: Option<Value>,
    /// Execution statistics.
    pub stats: ToolStats,
}

/// A registration that could not be admitted during discovery.
#[derive(Debug, Clone)]
pub struct RegistrationFailure {
    /// Advertising server.
    pub server: String,
    /// Advertised tool name.
    pub tool: String,
    /// Why the registration failed.
    pub reason: String,
}

/// Outcome of one discovery cycle.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Full names registered this cycle.
    pub added: Vec<String>,
    /// Full names removed this cycle.
    pub removed: Vec<String>,
    /// Full names whose descriptors changed in place.
    pub updated: Vec<String>,
    /// Registrations that failed.
    pub failed: Vec<RegistrationFailure>,
}

impl DiscoveryReport {
    /// Whether the cycle changed nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.updated.is_empty()
            && self.failed.is_empty()
    }
}

/// Unified registry of native and MCP tools.
pub struct ToolRegistry {
    tools: parking_lot::RwLock<HashMap<String, Arc<dyn Tool>>>,
    stats: parking_lot::Mutex<HashMap<String, ToolStats>>,
    namespaces: Arc<NamespaceManager>,
    manager: Arc<McpServerManager>,
    permissions: Arc<dyn PermissionManager>,
    classifier: Arc<OperationClassifier>,
    default_namespace: String,
    update_policy: UpdateSettings,
}

impl ToolRegistry {
    /// Create a registry over the given server manager with default policy.
    pub fn new(manager: Arc<McpServerManager>) -> Self {
        Self {
            tools: parking_lot::RwLock::new(HashMap::new()),
            stats: parking_lot::Mutex::new(HashMap::new()),
            namespaces: Arc::new(NamespaceManager::new()),
            manager,
            permissions: Arc::new(AllowAllPermissions),
            classifier: Arc::new(OperationClassifier::new()),
            default_namespace: "mcp".to_string(),
            update_policy: UpdateSettings::default(),
        }
    }

    /// Create a registry configured from settings.
    pub fn with_settings(manager: Arc<McpServerManager>, settings: &McpSettings) -> Self {
        Self {
            namespaces: Arc::new(NamespaceManager::with_settings(&settings.namespace)),
            default_namespace: settings.namespace.default_namespace.clone(),
            update_policy: settings.updates.clone(),
            ..Self::new(manager)
        }
    }

    /// Replace the caller permission policy.
    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionManager>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Replace the operation classifier.
    pub fn with_classifier(mut self, classifier: Arc<OperationClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// The namespace manager backing this registry.
    pub fn namespaces(&self) -> &Arc<NamespaceManager> {
        &self.namespaces
    }

    /// The server manager backing this registry.
    pub fn manager(&self) -> &Arc<McpServerManager> {
        &self.manager
    }

    /// Register a native tool under its own name.
    ///
    /// An existing tool with the same name is replaced.
    pub fn register_native(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        tracing::debug!(tool = %name, "registering native tool");
        self.tools.write().insert(name, tool);
    }

    /// Resolve a name or alias to the full name of a registered tool.
    pub fn resolve(&self, name: &str) -> Option<String> {
        if self.tools.read().contains_key(name) {
            return Some(name.to_string());
        }
        let full = self.namespaces.resolve(name)?;
        self.tools.read().contains_key(&full).then_some(full)
    }

    /// Look up a tool handle by name or alias.
    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let full = self.resolve(name)?;
        self.tools.read().get(&full).cloned()
    }

    /// Full names of registered tools, filtered by origin, sorted.
    pub fn list_tools(&self, include_native: bool, include_mcp: bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .iter()
            .filter(|(_, tool)| match tool.kind() {
                ToolKind::Native => include_native,
                ToolKind::Mcp => include_mcp,
            })
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.read().len()
    }

    /// Execution statistics for one tool.
    pub fn stats_for(&self, name: &str) -> ToolStats {
        let Some(full) = self.resolve(name) else {
            return ToolStats::default();
        };
        self.stats.lock().get(&full).cloned().unwrap_or_default()
    }

    /// Everything known about one tool.
    pub fn get_tool_info(&self, name: &str) -> Option<ToolInfoReport> {
        let full = self.resolve(name)?;
        let tool = self.tools.read().get(&full).cloned()?;
        let record = self.namespaces.record(&full);
        Some(ToolInfoReport {
            name: full.clone(),
            kind: tool.kind(),
            description: tool.description().to_string(),
            server: record.as_ref().map(|r| r.server.clone()),
            namespace: record.as_ref().map(|r| r.namespace.clone()),
            aliases: record.map(|r| r.aliases).unwrap_or_default(),
            schema: tool.input_schema().cloned(),
            stats: self.stats.lock().get(&full).cloned().unwrap_or_default(),
        })
    }

    /// Search names and descriptions.
    ///
    /// Substring hits rank above fuzzy (in-order subsequence) hits; the
    /// ranking is deterministic for a fixed registry and query.
    pub fn search_tools(&self, query: &str, fuzzy: bool) -> Vec<SearchMatch> {
        let query_lower = query.to_lowercase();
        let mut matches: Vec<SearchMatch> = self
            .tools
            .read()
            .iter()
            .filter_map(|(name, tool)| {
                let score = match_score(&query_lower, name, tool.description(), fuzzy)?;
                Some(SearchMatch {
                    full_name: name.clone(),
                    score,
                    description: tool.description().to_string(),
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.full_name.cmp(&b.full_name))
        });
        matches
    }

    /// Execute a tool with a fresh context.
    pub fn execute_tool(self: &Arc<Self>, name: &str, arguments: Value) -> ResultStream {
        self.execute_tool_with_context(name, arguments, ToolContext::new())
    }

    /// Execute a tool: resolve, validate, permit, then run.
    ///
    /// Every failure is converted into a terminal error result; the stream
    /// always ends with a success or error result.
    pub fn execute_tool_with_context(
        self: &Arc<Self>,
        name: &str,
        arguments: Value,
        ctx: ToolContext,
    ) -> ResultStream {
        let registry = Arc::clone(self);
        let name = name.to_string();
        Box::pin(async_stream::stream! {
            let execution_id = ctx.execution_id.clone();

            let Some(full_name) = registry.resolve(&name) else {
                yield ToolResult::error(
                    format!("Tool not found: {}", name),
                    &name,
                    &execution_id,
                )
                .with_metadata("error_type", "tool_not_found");
                return;
            };
            let Some(tool) = registry.tools.read().get(&full_name).cloned() else {
                yield ToolResult::error(
                    format!("Tool not found: {}", name),
                    &name,
                    &execution_id,
                )
                .with_metadata("error_type", "tool_not_found");
                return;
            };

            if let Err(e) = tool.validate_input(&arguments) {
                yield ToolResult::error(
                    format!("Invalid input for '{}': {}", full_name, e),
                    &full_name,
                    &execution_id,
                )
                .with_metadata("error_type", "invalid_input");
                return;
            }

            if let Err(e) = tool.check_permissions(&arguments, &ctx).await {
                yield ToolResult::error(
                    e.to_string(),
                    &full_name,
                    &execution_id,
                )
                .with_metadata("error_type", "permission_denied");
                return;
            }

            let started = Instant::now();
            let mut inner = tool.execute(arguments, ctx);
            while let Some(result) = inner.next().await {
                yield result;
            }
            registry.record_execution(&full_name, started.elapsed());
        })
    }

    fn record_execution(&self, full_name: &str, elapsed: std::time::Duration) {
        let mut stats = self.stats.lock();
        let entry = stats.entry(full_name.to_string()).or_default();
        entry.executions += 1;
        entry.total_duration_ms += elapsed.as_millis() as u64;
        entry.last_executed = Some(Utc::now());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Discovery
    // ─────────────────────────────────────────────────────────────────────

    /// One discovery cycle: fetch every server's tool list, then register
    /// new tools, drop vanished ones, and re-register changed descriptors.
    ///
    /// Per-server fetch failures were already isolated by the manager; a
    /// failed registration is reported and never aborts the cycle.
    pub async fn sync_mcp_tools(&self) -> DiscoveryReport {
        let advertised = self.manager.get_all_tools().await;
        let mut report = DiscoveryReport::default();

        let mut seen: HashMap<(String, String), ToolInfo> = HashMap::new();
        for (server, tools) in &advertised {
            for info in tools {
                seen.insert((server.clone(), info.name.clone()), info.clone());
            }
        }

        // Vanished tools go first so a rename frees its old name before the
        // new registration claims one.
        for record in self.namespaces.records() {
            let key = (record.server.clone(), record.original_name.clone());
            if !seen.contains_key(&key) {
                self.namespaces.unregister(&record.full_name);
                self.tools.write().remove(&record.full_name);
                self.stats.lock().remove(&record.full_name);
                tracing::info!(tool = %record.full_name, "unregistered vanished MCP tool");
                report.removed.push(record.full_name);
            }
        }

        let current: HashMap<(String, String), String> = self
            .namespaces
            .records()
            .into_iter()
            .map(|r| ((r.server.clone(), r.original_name.clone()), r.full_name))
            .collect();

        let mut servers: Vec<&String> = advertised.keys().collect();
        servers.sort();

        let mut pending_updates: Vec<(String, String, ToolInfo)> = Vec::new();
        for server in servers {
            let security = self
                .manager
                .server_config(server)
                .map(|c| c.security)
                .unwrap_or_default();
            let mut tools = advertised[server].clone();
            tools.sort_by(|a, b| a.name.cmp(&b.name));

            for info in tools {
                let key = (server.clone(), info.name.clone());
                match current.get(&key) {
                    None => match self.register_mcp_tool(server, &info, security.clone()) {
                        Ok(full_name) => {
                            tracing::info!(tool = %full_name, server = %server, "registered MCP tool");
                            report.added.push(full_name);
                        }
                        Err(reason) => {
                            tracing::warn!(
                                server = %server,
                                tool = %info.name,
                                reason = %reason,
                                "failed to register MCP tool"
                            );
                            report.failed.push(RegistrationFailure {
                                server: server.clone(),
                                tool: info.name.clone(),
                                reason,
                            });
                        }
                    },
                    Some(full_name) => {
                        let record = self.namespaces.record(full_name);
                        let changed = record
                            .map(|r| {
                                r.description != info.description.clone().unwrap_or_default()
                                    || r.schema != info.input_schema
                            })
                            .unwrap_or(false);
                        if changed {
                            pending_updates.push((full_name.clone(), server.clone(), info));
                        }
                    }
                }
            }
        }

        let chunk = match self.update_policy.mode {
            UpdateMode::Immediate => usize::MAX,
            UpdateMode::Batched => self.update_policy.max_concurrent.max(1),
        };
        for batch in pending_updates.chunks(chunk.min(pending_updates.len().max(1))) {
            for (full_name, server, info) in batch {
                let security = self
                    .manager
                    .server_config(server)
                    .map(|c| c.security)
                    .unwrap_or_default();
                self.namespaces.update_record(
                    full_name,
                    &info.description.clone().unwrap_or_default(),
                    info.input_schema.clone(),
                );
                let wrapper: Arc<dyn Tool> = Arc::new(McpToolWrapper::new(
                    info,
                    server.clone(),
                    full_name.clone(),
                    Arc::clone(&self.manager),
                    Arc::clone(&self.permissions),
                    Arc::clone(&self.classifier),
                    security,
                ));
                self.tools.write().insert(full_name.clone(), wrapper);
                tracing::info!(tool = %full_name, "re-registered updated MCP tool");
                report.updated.push(full_name.clone());
            }
        }

        report
    }

    fn register_mcp_tool(
        &self,
        server: &str,
        info: &ToolInfo,
        security: gwydion_mcp::SecurityPolicy,
    ) -> std::result::Result<String, String> {
        let record = self
            .namespaces
            .register_tool(
                &info.name,
                server,
                &self.default_namespace,
                &info.description.clone().unwrap_or_default(),
                info.input_schema.clone(),
            )
            .map_err(|e| e.to_string())?;

        let wrapper: Arc<dyn Tool> = Arc::new(McpToolWrapper::new(
            info,
            server,
            record.full_name.clone(),
            Arc::clone(&self.manager),
            Arc::clone(&self.permissions),
            Arc::clone(&self.classifier),
            security,
        ));
        self.tools.write().insert(record.full_name.clone(), wrapper);
        Ok(record.full_name)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list_tools(true, true))
            .finish_non_exhaustive()
    }
}

/// Score one tool against a query, higher is better. `None` means no match.
fn match_score(query_lower: &str, name: &str, description: &str, fuzzy: bool) -> Option<f64> {
    let name_lower = name.to_lowercase();
    let description_lower = description.to_lowercase();

    if name_lower == query_lower {
        return Some(1.0);
    }
    if name_lower.starts_with(query_lower) {
        return Some(0.9);
    }
    if name_lower.contains(query_lower) {
        return Some(0.7);
    }
    if description_lower.contains(query_lower) {
        return Some(0.4);
    }
    if fuzzy {
        if let Some(ratio) = subsequence_ratio(query_lower, &name_lower) {
            return Some(0.3 * ratio);
        }
    }
    None
}

/// If every query char appears in order in the target, the fraction of the
/// target it covers; else `None`.
fn subsequence_ratio(query: &str, target: &str) -> Option<f64> {
    if query.is_empty() {
        return None;
    }
    let mut target_chars = target.chars();
    for qc in query.chars() {
        target_chars.by_ref().find(|&tc| tc == qc)?;
    }
    Some(query.chars().count() as f64 / target.chars().count().max(1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ToolResultKind;
    use crate::tool::testing::StaticTool;
    use serde_json::json;

    fn registry() -> Arc<ToolRegistry> {
        Arc::new(ToolRegistry::new(Arc::new(McpServerManager::new())))
    }

    #[tokio::test]
    async fn test_register_native_and_execute() {
        let registry = registry();
        registry.register_native(Arc::new(StaticTool::new("greet", "hello")));

        assert_eq!(registry.list_tools(true, true), vec!["greet"]);
        assert_eq!(registry.list_tools(false, true), Vec::<String>::new());

        let results: Vec<ToolResult> =
            registry.execute_tool("greet", json!({})).collect().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, ToolResultKind::Success);
        assert_eq!(results[0].content, "hello");

        let stats = registry.stats_for("greet");
        assert_eq!(stats.executions, 1);
        assert!(stats.last_executed.is_some());
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_terminal_error() {
        let registry = registry();
        let results: Vec<ToolResult> =
            registry.execute_tool("ghost", json!({})).collect().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_error());
        assert_eq!(results[0].metadata["error_type"], "tool_not_found");
    }

    #[tokio::test]
    async fn test_execute_invalid_input_is_local() {
        let registry = registry();
        registry.register_native(Arc::new(StaticTool::new("typed", "ok").with_schema(json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        }))));

        let results: Vec<ToolResult> =
            registry.execute_tool("typed", json!({})).collect().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_error());
        assert_eq!(results[0].metadata["error_type"], "invalid_input");
        assert!(results[0].content.contains("path"));

        // The tool itself never ran.
        assert_eq!(registry.stats_for("typed").executions, 0);
    }

    #[tokio::test]
    async fn test_get_tool_info_native() {
        let registry = registry();
        registry.register_native(Arc::new(StaticTool::new("greet", "hello")));

        let info = registry.get_tool_info("greet").unwrap();
        assert_eq!(info.name, "greet");
        assert_eq!(info.kind, ToolKind::Native);
        assert!(info.server.is_none());
        assert!(registry.get_tool_info("ghost").is_none());
    }

    #[test]
    fn test_search_ranking_stable() {
        let registry = registry();
        registry.register_native(Arc::new(StaticTool::new("read_file", "Read a file from disk")));
        registry.register_native(Arc::new(StaticTool::new("read_url", "Fetch a URL")));
        registry.register_native(Arc::new(StaticTool::new("summarize", "Summarize file contents")));

        let matches = registry.search_tools("read", false);
        assert_eq!(matches.len(), 2);
        // Equal scores break ties by name, so the ranking is reproducible.
        assert_eq!(matches[0].full_name, "read_file");
        assert_eq!(matches[1].full_name, "read_url");

        let again = registry.search_tools("read", false);
        let names: Vec<_> = again.iter().map(|m| m.full_name.clone()).collect();
        assert_eq!(names, vec!["read_file", "read_url"]);

        // Description-only hit ranks below name hits.
        let matches = registry.search_tools("file", false);
        assert_eq!(matches[0].full_name, "read_file");
        assert!(matches.iter().any(|m| m.full_name == "summarize"));
    }

    #[test]
    fn test_search_fuzzy_subsequence() {
        let registry = registry();
        registry.register_native(Arc::new(StaticTool::new("read_file", "")));

        assert!(registry.search_tools("rdfl", false).is_empty());
        let matches = registry.search_tools("rdfl", true);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].score > 0.0);
        assert!(matches[0].score < 0.4);
    }

    #[test]
    fn test_subsequence_ratio() {
        assert!(subsequence_ratio("rdfl", "read_file").is_some());
        assert!(subsequence_ratio("xyz", "read_file").is_none());
        assert!(subsequence_ratio("", "read_file").is_none());
    }

}
