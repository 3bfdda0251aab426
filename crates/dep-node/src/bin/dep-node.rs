//! Minimal daemon entry point: load configuration from the environment,
//! start a node, and run until interrupted. Flag parsing and multi-source
//! config layering belong to whatever deploys this binary, not to the
//! binary itself (§1 Non-goals).

use dep_logging::context::NodeContextGuard;
use dep_logging::{ConsoleConfig, DepSubscriberBuilder, LogConfig};
use dep_node::{DepNode, NodeConfig};

#[tokio::main]
async fn main() {
    let log_level = std::env::var("DEP_LOG").unwrap_or_else(|_| "info".to_string());
    let _log_guard = DepSubscriberBuilder::new()
        .with_config(LogConfig {
            default_level: log_level,
            console: ConsoleConfig {
                enabled: true,
                pretty: std::env::var("DEP_LOG_PRETTY").is_ok(),
                ..ConsoleConfig::default()
            },
            ..LogConfig::default()
        })
        .init();

    let config = NodeConfig::from_env(NodeConfig::default());

    let node = match DepNode::new(config).await {
        Ok(node) => node,
        Err(e) => {
            tracing::error!(error = %e, "failed to construct node");
            std::process::exit(1);
        }
    };

    let _ctx = NodeContextGuard::new(&node.node_id());

    if let Err(e) = node.start().await {
        tracing::error!(error = %e, "failed to start node");
        std::process::exit(1);
    }

    tracing::info!(node_id = %node.node_id(), "dep-node running, press ctrl-c to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c, shutting down anyway");
    }

    tracing::info!("shutting down");
    if let Err(e) = node.stop().await {
        tracing::error!(error = %e, "error during shutdown");
    }
}
