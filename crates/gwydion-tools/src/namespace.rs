//! Hierarchical tool naming.
//!
//! Every registered tool gets a globally unique full name of the form
//! `namespace:tool`, possibly with server-derived suffixes when two servers
//! advertise the same tool name. The namespace graph is a forest with a
//! bounded depth. Aliases (bare tool name, `server/tool`) are created only
//! when they collide with nothing.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use gwydion_mcp::{ConflictMode, NamespaceSettings};

use crate::error::{Result, ToolError};

/// Registry-held entry for one admitted tool.
#[derive(Debug, Clone)]
pub struct ToolRecord {
    /// Globally unique full name.
    pub full_name: String,
    /// Originating server.
    pub server: String,
    /// Tool name as the server advertises it.
    pub original_name: String,
    /// Owning namespace.
    pub namespace: String,
    /// Advertised description.
    pub description: String,
    /// Advertised input schema.
    pub schema: Option<Value>,
    /// Aliases resolving to this record.
    pub aliases: Vec<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

/// Audit entry for one resolved name collision.
#[derive(Debug, Clone)]
pub struct ConflictRecord {
    /// The name that was requested.
    pub requested: String,
    /// The name the registration ended up with.
    pub resolved: String,
    /// Server whose registration hit the conflict.
    pub server: String,
    /// Strategy that resolved it.
    pub strategy: ConflictMode,
    /// When it happened.
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug)]
struct NamespaceEntry {
    parent: Option<String>,
    description: Option<String>,
    children: BTreeSet<String>,
    tools: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct NamespaceState {
    namespaces: HashMap<String, NamespaceEntry>,
    records: HashMap<String, ToolRecord>,
    aliases: HashMap<String, String>,
    conflicts: Vec<ConflictRecord>,
}

/// Assigns unique full names, resolves collisions, maintains aliases.
#[derive(Debug)]
pub struct NamespaceManager {
    state: Mutex<NamespaceState>,
    max_depth: usize,
    strategy: ConflictMode,
    create_aliases: bool,
}

impl Default for NamespaceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceManager {
    /// Create a manager with default settings.
    pub fn new() -> Self {
        Self::with_settings(&NamespaceSettings::default())
    }

    /// Create a manager configured from settings.
    pub fn with_settings(settings: &NamespaceSettings) -> Self {
        Self {
            state: Mutex::new(NamespaceState::default()),
            max_depth: settings.max_depth,
            strategy: settings.conflict,
            create_aliases: settings.aliases,
        }
    }

    /// The configured conflict strategy.
    pub fn strategy(&self) -> ConflictMode {
        self.strategy
    }

    /// Create a namespace, optionally under a parent.
    ///
    /// Fails if the namespace exists, the parent is unknown, or the new
    /// depth would exceed the configured maximum.
    pub fn create_namespace(
        &self,
        name: &str,
        description: Option<&str>,
        parent: Option<&str>,
    ) -> Result<()> {
        if name.is_empty() || name.contains(':') {
            return Err(ToolError::namespace(format!(
                "invalid namespace name '{}'",
                name
            )));
        }
        let mut state = self.state.lock();
        if state.namespaces.contains_key(name) {
            return Err(ToolError::namespace(format!(
                "namespace '{}' already exists",
                name
            )));
        }
        if let Some(parent_name) = parent {
            if parent_name == name {
                return Err(ToolError::namespace("namespace cannot be its own parent"));
            }
            let depth = Self::depth_of(&state, parent_name).ok_or_else(|| {
                ToolError::namespace(format!("parent namespace '{}' does not exist", parent_name))
            })?;
            if depth + 1 >= self.max_depth {
                return Err(ToolError::namespace(format!(
                    "namespace depth limit ({}) exceeded",
                    self.max_depth
                )));
            }
            if let Some(entry) = state.namespaces.get_mut(parent_name) {
                entry.children.insert(name.to_string());
            }
        }
        state.namespaces.insert(
            name.to_string(),
            NamespaceEntry {
                parent: parent.map(String::from),
                description: description.map(String::from),
                children: BTreeSet::new(),
                tools: BTreeSet::new(),
            },
        );
        Ok(())
    }

    fn depth_of(state: &NamespaceState, name: &str) -> Option<usize> {
        let mut depth = 0;
        let mut current = name;
        loop {
            let entry = state.namespaces.get(current)?;
            match &entry.parent {
                Some(parent) => {
                    depth += 1;
                    current = parent;
                }
                None => return Some(depth),
            }
        }
    }

    /// Whether a namespace exists.
    pub fn has_namespace(&self, name: &str) -> bool {
        self.state.lock().namespaces.contains_key(name)
    }

    /// Register a tool under a namespace and return its record.
    ///
    /// The candidate name is `namespace:tool`; on collision, the configured
    /// strategy applies. The namespace is created at the root if missing.
    pub fn register_tool(
        &self,
        tool_name: &str,
        server: &str,
        namespace: &str,
        description: &str,
        schema: Option<Value>,
    ) -> Result<ToolRecord> {
        let mut state = self.state.lock();
        if !state.namespaces.contains_key(namespace) {
            state.namespaces.insert(
                namespace.to_string(),
                NamespaceEntry {
                    parent: None,
                    description: None,
                    children: BTreeSet::new(),
                    tools: BTreeSet::new(),
                },
            );
        }

        let candidate = format!("{}:{}", namespace, tool_name);
        let full_name = if state.records.contains_key(&candidate) {
            match self.strategy {
                ConflictMode::Reject => {
                    return Err(ToolError::namespace(format!(
                        "name '{}' is already registered",
                        candidate
                    )));
                }
                ConflictMode::Replace => {
                    tracing::warn!(name = %candidate, server = %server, "replacing registered tool");
                    Self::remove_record(&mut state, &candidate);
                    state.conflicts.push(ConflictRecord {
                        requested: candidate.clone(),
                        resolved: candidate.clone(),
                        server: server.to_string(),
                        strategy: ConflictMode::Replace,
                        occurred_at: Utc::now(),
                    });
                    candidate.clone()
                }
                ConflictMode::Suffix => {
                    let mut resolved = format!("{}_{}", candidate, server);
                    let mut n: u32 = 2;
                    while state.records.contains_key(&resolved) {
                        resolved = format!("{}_{}_{}", candidate, server, n);
                        n += 1;
                    }
                    tracing::debug!(
                        requested = %candidate,
                        resolved = %resolved,
                        "tool name conflict resolved with suffix"
                    );
                    state.conflicts.push(ConflictRecord {
                        requested: candidate.clone(),
                        resolved: resolved.clone(),
                        server: server.to_string(),
                        strategy: ConflictMode::Suffix,
                        occurred_at: Utc::now(),
                    });
                    resolved
                }
            }
        } else {
            candidate
        };

        let mut aliases = Vec::new();
        if self.create_aliases {
            for alias in [tool_name.to_string(), format!("{}/{}", server, tool_name)] {
                let collides = state.aliases.contains_key(&alias)
                    || state.records.contains_key(&alias)
                    || alias == full_name;
                if !collides {
                    state.aliases.insert(alias.clone(), full_name.clone());
                    aliases.push(alias);
                }
            }
        }

        let record = ToolRecord {
            full_name: full_name.clone(),
            server: server.to_string(),
            original_name: tool_name.to_string(),
            namespace: namespace.to_string(),
            description: description.to_string(),
            schema,
            aliases,
            created_at: Utc::now(),
        };

        if let Some(entry) = state.namespaces.get_mut(namespace) {
            entry.tools.insert(full_name.clone());
        }
        state.records.insert(full_name, record.clone());
        Ok(record)
    }

    /// Resolve a full name or alias to a full name.
    pub fn resolve(&self, name: &str) -> Option<String> {
        let state = self.state.lock();
        if state.records.contains_key(name) {
            return Some(name.to_string());
        }
        state.aliases.get(name).cloned()
    }

    /// The record for a full name.
    pub fn record(&self, full_name: &str) -> Option<ToolRecord> {
        self.state.lock().records.get(full_name).cloned()
    }

    /// All records, sorted by full name.
    pub fn records(&self) -> Vec<ToolRecord> {
        let state = self.state.lock();
        let mut records: Vec<_> = state.records.values().cloned().collect();
        records.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        records
    }

    /// Update the stored descriptor for a tool in place.
    pub fn update_record(&self, full_name: &str, description: &str, schema: Option<Value>) -> bool {
        let mut state = self.state.lock();
        match state.records.get_mut(full_name) {
            Some(record) => {
                record.description = description.to_string();
                record.schema = schema;
                true
            }
            None => false,
        }
    }

    /// Remove a record and all its aliases. Returns whether it existed.
    pub fn unregister(&self, full_name: &str) -> bool {
        let mut state = self.state.lock();
        Self::remove_record(&mut state, full_name)
    }

    fn remove_record(state: &mut NamespaceState, full_name: &str) -> bool {
        let Some(record) = state.records.remove(full_name) else {
            return false;
        };
        state.aliases.retain(|_, target| target != full_name);
        if let Some(entry) = state.namespaces.get_mut(&record.namespace) {
            entry.tools.remove(full_name);
        }
        true
    }

    /// Conflicts encountered so far, oldest first.
    pub fn conflicts(&self) -> Vec<ConflictRecord> {
        self.state.lock().conflicts.clone()
    }

    /// Number of registered records.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Whether no tool is registered.
    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }
}
