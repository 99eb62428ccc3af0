/// Strata: multi-project content store with environments and peer sync
/// 
/// Main entry point for the Strata server. Initializes configuration and starts
/// the HTTP server.

use strata::{config::Config, server::start_server};

/// Application entry point
/// 
/// Initializes the server with configuration from the environment and starts
/// listening for requests. The server provides:
/// - Project and environment management at /api/projects/*
/// - Resource access at /api/{project}/{environment}/{category}/*
/// - Health check at /healthz
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // STRATA_* variables, falling back to localhost and ./data
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
