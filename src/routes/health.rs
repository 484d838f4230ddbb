// ============================================================================
// Health Route
// ============================================================================
//
// GET / and GET /health - unauthenticated service identity check
//
// ============================================================================

use axum::{response::IntoResponse, Json};
use serde_json::json;

use crate::config::DOCS_URL;

/// GET / and GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "docs": DOCS_URL,
    }))
}
