/// nodeshare node - serves the local library and the friend/sync API
use nodeshare_core::{Config, Node};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let node = Node::new(config)
        .map_err(|e| anyhow::anyhow!("Startup error: {}", e))?;
    info!("Starting nodeshare node");
    info!("   Peer ID: {}", node.identity.peer_id);
    info!("   Listening on: {}", node.config().listen_addr);

    node.start().await
        .map_err(|e| anyhow::anyhow!("Node error: {}", e))?;

    Ok(())
}
