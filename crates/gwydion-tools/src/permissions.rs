//! Permission checks for tool execution.
//!
//! Two gates exist: a caller-supplied [`PermissionManager`] consulted for
//! every tool, and a per-server security policy applied to MCP tools. The
//! security gate classifies the operation from the tool's original name via
//! a keyword table (overridable by operators) and screens any path-shaped
//! argument against the server's allowed/forbidden path lists.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use gwydion_mcp::{OperationKind, SecurityPolicy};

/// Caller policy consulted before any tool runs.
#[async_trait]
pub trait PermissionManager: Send + Sync {
    /// Whether the caller may run the named tool with these arguments.
    async fn check_tool_permission(&self, tool_name: &str, arguments: &Value) -> bool;
}

/// Policy that admits every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllPermissions;

#[async_trait]
impl PermissionManager for AllowAllPermissions {
    async fn check_tool_permission(&self, _tool_name: &str, _arguments: &Value) -> bool {
        true
    }
}

/// Policy that refuses an explicit set of tool names.
#[derive(Debug, Clone, Default)]
pub struct DenyListPermissions {
    denied: HashSet<String>,
}

impl DenyListPermissions {
    /// Create an empty deny list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny a tool name.
    pub fn deny(mut self, tool_name: impl Into<String>) -> Self {
        self.denied.insert(tool_name.into());
        self
    }
}

#[async_trait]
impl PermissionManager for DenyListPermissions {
    async fn check_tool_permission(&self, tool_name: &str, _arguments: &Value) -> bool {
        !self.denied.contains(tool_name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operation classification
// ─────────────────────────────────────────────────────────────────────────────

/// Keyword table mapping tool-name fragments to operation classes.
///
/// The defaults mirror common naming conventions; operators can replace any
/// rule set without touching the checking code.
#[derive(Debug, Clone)]
pub struct OperationClassifier {
    rules: Vec<(OperationKind, Vec<&'static str>)>,
}

impl Default for OperationClassifier {
    fn default() -> Self {
        Self {
            rules: vec![
                (OperationKind::Read, vec!["read", "get", "list", "show"]),
                (OperationKind::Write, vec!["write", "create", "update", "edit"]),
                (OperationKind::Delete, vec!["delete", "remove", "rm"]),
                (OperationKind::Execute, vec!["execute", "run", "exec"]),
            ],
        }
    }
}

impl OperationClassifier {
    /// Create the default table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the keywords for one operation class.
    pub fn with_rule(mut self, op: OperationKind, keywords: Vec<&'static str>) -> Self {
        self.rules.retain(|(existing, _)| *existing != op);
        self.rules.push((op, keywords));
        self
    }

    /// Infer the operation class from a tool name, first match wins.
    pub fn classify(&self, tool_name: &str) -> Option<OperationKind> {
        let lowered = tool_name.to_lowercase();
        for (op, keywords) in &self.rules {
            if keywords.iter().any(|k| lowered.contains(k)) {
                return Some(*op);
            }
        }
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Security policy enforcement
// ─────────────────────────────────────────────────────────────────────────────

/// Check a server's security policy against one invocation.
///
/// Returns a human-readable refusal reason on denial.
pub fn check_security_policy(
    policy: &SecurityPolicy,
    classifier: &OperationClassifier,
    original_tool_name: &str,
    arguments: &Value,
) -> Result<(), String> {
    if let Some(op) = classifier.classify(original_tool_name)
        && !policy.allows_operation(op)
    {
        return Err(format!(
            "operation '{}' is not allowed for this server",
            op
        ));
    }

    if !policy.restricts_paths() {
        return Ok(());
    }

    for path in candidate_paths(arguments) {
        let resolved = normalize_path(&path);

        for forbidden in &policy.forbidden_paths {
            let forbidden = normalize_path(forbidden);
            if resolved.starts_with(&forbidden) {
                return Err(format!(
                    "path '{}' is forbidden (under '{}')",
                    resolved.display(),
                    forbidden.display()
                ));
            }
        }

        if !policy.allowed_paths.is_empty() {
            let permitted = policy
                .allowed_paths
                .iter()
                .any(|allowed| resolved.starts_with(normalize_path(allowed)));
            if !permitted {
                return Err(format!(
                    "path '{}' is outside every allowed path",
                    resolved.display()
                ));
            }
        }
    }

    Ok(())
}

/// Argument values that look like filesystem paths: string values whose
/// field name mentions "path" or "file".
fn candidate_paths(arguments: &Value) -> Vec<PathBuf> {
    let Some(object) = arguments.as_object() else {
        return Vec::new();
    };
    object
        .iter()
        .filter(|(key, _)| {
            let key = key.to_lowercase();
            key.contains("path") || key.contains("file")
        })
        .filter_map(|(_, value)| value.as_str())
        .map(PathBuf::from)
        .collect()
}

/// Lexically absolutize and normalize a path without touching the
/// filesystem, so restrictions also apply to paths that do not exist yet.
fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    normalized
}
