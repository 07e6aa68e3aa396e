//! Registry integration tests against the mock MCP server.
//!
//! The mock binary is built by the gwydion-mcp package; tests skip with a
//! message when it has not been built yet.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;

use gwydion_mcp::{McpServerConfig, McpServerManager, OperationKind, SecurityPolicy};
use gwydion_tools::{ToolContext, ToolRegistry, ToolResult, ToolResultKind};

fn mock_server_path() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop(); // crates
    path.pop(); // workspace root
    path.push("target");
    path.push(if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    });
    path.push("mock-mcp-server");
    path
}

fn mock_server_exists() -> bool {
    mock_server_path().exists()
}

fn mock_config(name: &str) -> McpServerConfig {
    McpServerConfig::stdio(name, mock_server_path().to_string_lossy().to_string())
}

async fn collect(mut stream: gwydion_tools::ResultStream) -> Vec<ToolResult> {
    let mut results = Vec::new();
    while let Some(result) = stream.next().await {
        results.push(result);
    }
    results
}

async fn registry_with_servers(configs: Vec<McpServerConfig>) -> Arc<ToolRegistry> {
    let manager = Arc::new(McpServerManager::new());
    for config in configs {
        manager.add_server(config);
    }
    manager.start().await;
    let registry = Arc::new(ToolRegistry::new(manager));
    registry.sync_mcp_tools().await;
    registry
}

#[tokio::test]
async fn test_discovery_registers_all_tools() {
    if !mock_server_exists() {
        eprintln!(
            "Skipping test: mock-mcp-server not built. Run `cargo build --package gwydion-mcp` first."
        );
        return;
    }

    let registry = registry_with_servers(vec![mock_config("files")]).await;

    let tools = registry.list_tools(false, true);
    assert_eq!(tools.len(), 5);
    assert!(tools.contains(&"mcp:echo".to_string()));
    assert!(tools.contains(&"mcp:read_file".to_string()));

    let info = registry.get_tool_info("mcp:echo").unwrap();
    assert_eq!(info.server.as_deref(), Some("files"));
    assert!(info.description.contains("Echo back the input"));
    assert!(info.schema.is_some());
    assert!(info.aliases.contains(&"echo".to_string()));

    registry.manager().stop().await;
}

#[tokio::test]
async fn test_execute_tool_success_stream() {
    if !mock_server_exists() {
        eprintln!("Skipping test: mock-mcp-server not built");
        return;
    }

    let registry = registry_with_servers(vec![mock_config("files")]).await;

    let results = collect(registry.execute_tool("mcp:echo", json!({"message": "pong"}))).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].kind, ToolResultKind::Progress);
    assert_eq!(results[1].kind, ToolResultKind::Success);
    assert!(results[1].content.contains("pong"));
    assert_eq!(results[1].metadata["server_name"], "files");
    assert!(results[1].metadata.contains_key("execution_time"));

    // Aliases address the same tool.
    let results = collect(registry.execute_tool("echo", json!({"message": "again"}))).await;
    assert!(results.last().unwrap().content.contains("again"));

    let stats = registry.stats_for("mcp:echo");
    assert_eq!(stats.executions, 2);

    registry.manager().stop().await;
}

#[tokio::test]
async fn test_invalid_input_fails_locally() {
    if !mock_server_exists() {
        eprintln!("Skipping test: mock-mcp-server not built");
        return;
    }

    let registry = registry_with_servers(vec![mock_config("files")]).await;

    // read_file requires file_path; the failure is produced by the local
    // validator as a single terminal result.
    let results = collect(registry.execute_tool("mcp:read_file", json!({}))).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].is_error());
    assert_eq!(results[0].metadata["error_type"], "invalid_input");
    assert!(results[0].content.contains("file_path"));
    assert_eq!(registry.stats_for("mcp:read_file").executions, 0);

    registry.manager().stop().await;
}

#[tokio::test]
async fn test_forbidden_path_denied_before_any_remote_call() {
    if !mock_server_exists() {
        eprintln!("Skipping test: mock-mcp-server not built");
        return;
    }

    let config = mock_config("files").with_security(SecurityPolicy {
        forbidden_paths: vec![PathBuf::from("/etc")],
        ..Default::default()
    });
    let registry = registry_with_servers(vec![config]).await;

    let results = collect(
        registry.execute_tool("mcp:read_file", json!({"file_path": "/etc/passwd"})),
    )
    .await;
    assert_eq!(results.len(), 1);
    assert!(results[0].is_error());
    assert_eq!(results[0].metadata["error_type"], "permission_denied");
    assert_eq!(registry.stats_for("mcp:read_file").executions, 0);

    registry.manager().stop().await;
}

#[tokio::test]
async fn test_operation_restriction_denied() {
    if !mock_server_exists() {
        eprintln!("Skipping test: mock-mcp-server not built");
        return;
    }

    // Only writes allowed: read_file classifies as a read and is refused.
    let config = mock_config("files").with_security(SecurityPolicy {
        allowed_operations: vec![OperationKind::Write],
        ..Default::default()
    });
    let registry = registry_with_servers(vec![config]).await;

    let results = collect(
        registry.execute_tool("mcp:read_file", json!({"file_path": "/tmp/ok"})),
    )
    .await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].metadata["error_type"], "permission_denied");

    registry.manager().stop().await;
}

#[tokio::test]
async fn test_session_context_round_trip() {
    if !mock_server_exists() {
        eprintln!("Skipping test: mock-mcp-server not built");
        return;
    }

    let registry = registry_with_servers(vec![mock_config("files")]).await;

    // read_file advertises _session_context and echoes its arguments, so
    // the wire arguments are observable in the result content.
    let mut session_context = HashMap::new();
    session_context.insert("workspace".to_string(), json!("/srv/project"));
    let ctx = ToolContext::new()
        .with_session("session-9")
        .with_session_context(session_context);

    let results = collect(registry.execute_tool_with_context(
        "mcp:read_file",
        json!({"file_path": "/tmp/notes.txt", "session_id": "leak-me-not"}),
        ctx,
    ))
    .await;

    let success = results.last().unwrap();
    assert_eq!(success.kind, ToolResultKind::Success);
    let wire_args: serde_json::Value = serde_json::from_str(&success.content).unwrap();
    assert_eq!(wire_args["file_path"], "/tmp/notes.txt");
    assert_eq!(wire_args["_session_context"]["workspace"], "/srv/project");
    assert!(wire_args.get("session_id").is_none());

    registry.manager().stop().await;
}

#[tokio::test]
async fn test_name_conflict_across_servers_gets_suffix() {
    if !mock_server_exists() {
        eprintln!("Skipping test: mock-mcp-server not built");
        return;
    }

    // Both servers advertise identical tool names; the second registration
    // of each name must pick up a server-derived suffix.
    let registry = registry_with_servers(vec![mock_config("alpha"), mock_config("beta")]).await;

    let tools = registry.list_tools(false, true);
    assert_eq!(tools.len(), 10);
    assert!(tools.contains(&"mcp:echo".to_string()));
    assert!(tools.contains(&"mcp:echo_beta".to_string()));

    let plain = registry.get_tool_info("mcp:echo").unwrap();
    let suffixed = registry.get_tool_info("mcp:echo_beta").unwrap();
    assert_eq!(plain.server.as_deref(), Some("alpha"));
    assert_eq!(suffixed.server.as_deref(), Some("beta"));

    let conflicts = registry.namespaces().conflicts();
    assert_eq!(conflicts.len(), 5);

    // Both full names execute against their own server.
    let results = collect(registry.execute_tool("mcp:echo_beta", json!({"message": "b"}))).await;
    assert_eq!(results.last().unwrap().kind, ToolResultKind::Success);

    registry.manager().stop().await;
}

#[tokio::test]
async fn test_tool_removal_on_next_cycle() {
    if !mock_server_exists() {
        eprintln!("Skipping test: mock-mcp-server not built");
        return;
    }

    let registry = registry_with_servers(vec![mock_config("files")]).await;
    assert_eq!(registry.list_tools(false, true).len(), 5);

    // Tear the server down; the next cycle sees no advertisements from it.
    registry.manager().stop().await;
    let report = registry.sync_mcp_tools().await;
    assert_eq!(report.removed.len(), 5);
    assert!(registry.list_tools(false, true).is_empty());
    assert!(registry.namespaces().is_empty());
    assert_eq!(registry.resolve("echo"), None);
}

#[tokio::test]
async fn test_call_timeout_surfaces_as_execution_error() {
    if !mock_server_exists() {
        eprintln!("Skipping test: mock-mcp-server not built");
        return;
    }

    let config = McpServerConfig::stdio(
        "mute",
        mock_server_path().to_string_lossy().to_string(),
    )
    .with_arg("--no-answer-call")
    .with_timeout(Duration::from_secs(1));
    let registry = registry_with_servers(vec![config]).await;

    let started = std::time::Instant::now();
    let results = collect(registry.execute_tool("mcp:echo", json!({"message": "hi"}))).await;
    assert!(started.elapsed() < Duration::from_secs(4));

    let terminal = results.last().unwrap();
    assert!(terminal.is_error());
    assert_eq!(terminal.metadata["error_type"], "execution_error");
    assert!(terminal.content.to_lowercase().contains("timeout"));

    registry.manager().stop().await;
}
