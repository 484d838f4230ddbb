// ============================================================================
// LivChat API Gateway
// ============================================================================
//
// Multi-tenant gateway between external developer clients and the private
// WhatsApp automation backend. Authenticates bearer API keys, enforces
// per-key sliding-window rate limits, resolves instance credentials,
// rewrites bodies between the public camelCase contract and the backend's
// PascalCase wire format, and proxies to the target backend.
//
// ============================================================================

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod instance;
pub mod rate_limit;
pub mod routes;
pub mod transform;

use crate::context::AppContext;

/// Serve the gateway on an already-bound listener until shutdown.
pub async fn serve(ctx: Arc<AppContext>, listener: TcpListener) -> Result<()> {
    let app = routes::create_router(ctx);
    axum::serve(listener, app)
        .await
        .context("Failed to start server")
}
