//! End-to-end demo: initialize the MCP integration from a settings file,
//! list the discovered tools, and run one call through the bridge.
//!
//! Usage:
//!   gwydion-demo <settings.yaml> [tool-name] [arguments-json]

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing_subscriber::EnvFilter;

use gwydion_bridge::McpIntegration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next().map(PathBuf::from) else {
        bail!("usage: gwydion-demo <settings.yaml> [tool-name] [arguments-json]");
    };
    let tool_name = args.next();
    let arguments: serde_json::Value = match args.next() {
        Some(raw) => serde_json::from_str(&raw).context("arguments must be JSON")?,
        None => serde_json::json!({}),
    };

    let integration = McpIntegration::new();
    if !integration.initialize(Some(&config_path)).await {
        bail!("initialization failed, check the logs");
    }

    let tools = integration.list_tools(true, true)?;
    println!("{} tools registered:", tools.len());
    for name in &tools {
        let info = integration.get_tool_info(name)?;
        match info {
            Some(info) => println!("  {:<32} {}", name, info.description),
            None => println!("  {}", name),
        }
    }

    if let Some(tool_name) = tool_name {
        println!("\ncalling {} ...", tool_name);
        let outcome = integration.call_tool_safe(&tool_name, arguments).await;
        if outcome.success {
            println!("ok:\n{}", outcome.content.unwrap_or_default());
        } else {
            println!("failed: {}", outcome.error.unwrap_or_default());
        }
    }

    integration.shutdown().await;
    Ok(())
}
