// ============================================================================
// LivChat API Gateway - Entry Point
// ============================================================================
//
// Single entry point for all external developer requests.
// It handles:
// - Bearer API key authentication (validated against the application backend)
// - Per-key sliding-window rate limiting
// - WhatsApp instance resolution from the `from` field
// - camelCase <-> PascalCase body transformation
// - Request routing to the automation and application backends
//
// Architecture:
// - Single stateless binary (rate-limit state is per-key SQLite on disk)
// - Static route table dispatches by exact path match
//
// ============================================================================

use anyhow::{Context, Result};
use livchat_gateway::config::Config;
use livchat_gateway::context::AppContext;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("=== LivChat API Gateway Starting ===");
    info!("Port: {}", config.port);
    info!("Automation backend: {}", config.automation_url);
    info!("Application backend: {}", config.app_url);

    let port = config.port;
    let ctx = Arc::new(AppContext::new(Arc::new(config)));

    // Start server
    let addr: SocketAddr = format!("0.0.0.0:{}", port)
        .parse()
        .context("Failed to parse bind address")?;

    info!("API Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    livchat_gateway::serve(ctx, listener).await
}
