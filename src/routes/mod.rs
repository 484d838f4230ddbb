// ============================================================================
// Request Pipeline
// ============================================================================
//
// Per-request flow:
//   OPTIONS -> CORS preflight (middleware)
//   GET / or /health -> health reply
//   bypass route -> pass-through proxy (no bearer, no rate limit)
//   internal route -> shared secret check, then pass-through proxy
//   everything else -> bearer extraction -> key validation -> rate limit
//                      -> dispatch -> rate-limit headers -> usage log
//
// Structure:
// - mod.rs: Router assembly and the pipeline fallback handler
// - health.rs: Health endpoint
// - middleware.rs: Request logging and CORS
//
// ============================================================================

mod health;
pub mod middleware;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, Method, Response, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::auth::ApiKeyData;
use crate::context::AppContext;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{dispatch, dispatch_bypass, get_route, AuthMode};
use crate::rate_limit::RateLimitDecision;

/// Create the main application router
pub fn create_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        // Health endpoints bypass the pipeline entirely
        .route("/", get(health::health_check))
        .route("/health", get(health::health_check))
        // Everything else flows through the pipeline
        .fallback(handle_request)
        // Apply middleware (order matters - last added runs first)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(middleware::request_logging))
                .layer(axum::middleware::from_fn(middleware::cors))
                .into_inner(),
        )
        .with_state(ctx)
}

/// Pipeline entry point for every non-health path.
async fn handle_request(
    State(ctx): State<Arc<AppContext>>,
    request: Request,
) -> Response<Body> {
    match process(&ctx, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn process(ctx: &AppContext, request: Request) -> GatewayResult<Response<Body>> {
    let path = request.uri().path().to_string();

    // Bypass and internal routes branch off before bearer extraction
    if let Some(route) = get_route(&path) {
        match route.auth {
            AuthMode::Bypass => return dispatch_bypass(ctx, request).await,
            AuthMode::InternalSecret => {
                verify_internal_secret(ctx, request.headers())?;
                return dispatch_bypass(ctx, request).await;
            }
            AuthMode::Bearer => {}
        }
    }

    // ============ Extract and validate the API key ============
    let token = extract_bearer(request.headers()).ok_or(GatewayError::AuthMissing)?;

    let key = ctx
        .validator
        .validate(&token)
        .await?
        .ok_or_else(|| GatewayError::AuthInvalid("Invalid API key".to_string()))?;

    if !key.is_active {
        return Err(GatewayError::AuthInvalid(
            "API key has been revoked".to_string(),
        ));
    }

    // ============ Rate limiting ============
    let decision = ctx
        .rate_limiter
        .check(
            &key.id,
            key.rate_limit_requests,
            key.rate_limit_window_seconds,
        )
        .await?;

    if !decision.allowed {
        return Err(GatewayError::RateLimited {
            limit: key.rate_limit_requests,
            window_seconds: key.rate_limit_window_seconds,
            reset_at: decision.reset_at,
        });
    }

    // ============ Dispatch ============
    let method = request.method().clone();

    // Routing errors (404/403/405) still carry rate-limit headers and are
    // logged as usage; only a failed backend fetch aborts without them.
    let mut response = match dispatch(ctx, request, &key).await {
        Ok(response) => response,
        Err(err @ GatewayError::Upstream(_)) => return Err(err),
        Err(err) => err.into_response(),
    };

    enrich_rate_limit_headers(response.headers_mut(), &key, &decision);

    // ============ Usage logging (fire-and-forget) ============
    let status = response.status();
    let key = Arc::clone(&key);
    tokio::spawn(async move {
        log_usage(&key, &path, &method, status);
    });

    Ok(response)
}

/// Pull the token out of `Authorization: Bearer <token>`.
fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

/// Constant-time comparison of the shared internal secret. The upstream
/// endpoint verifies it again; checking here keeps bad traffic off the
/// internal channel.
fn verify_internal_secret(ctx: &AppContext, headers: &HeaderMap) -> GatewayResult<()> {
    let provided = headers
        .get("X-Internal-Secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !bool::from(
        provided
            .as_bytes()
            .ct_eq(ctx.config.internal_secret.as_bytes()),
    ) {
        return Err(GatewayError::AuthInvalid(
            "Invalid internal secret".to_string(),
        ));
    }
    Ok(())
}

fn enrich_rate_limit_headers(
    headers: &mut HeaderMap,
    key: &ApiKeyData,
    decision: &RateLimitDecision,
) {
    let pairs = [
        ("X-RateLimit-Limit", key.rate_limit_requests.to_string()),
        ("X-RateLimit-Remaining", decision.remaining.to_string()),
        ("X-RateLimit-Reset", decision.reset_at.to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = axum::http::HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

/// Emit one structured usage event. Failures here are invisible to the
/// caller; the event stream is observability, not billing truth.
fn log_usage(key: &ApiKeyData, endpoint: &str, method: &Method, status: StatusCode) {
    tracing::info!(
        target: "api_usage",
        api_key_id = %key.id,
        organization_id = key.organization_id.as_deref().unwrap_or(""),
        endpoint = %endpoint,
        method = %method,
        status = status.as_u16(),
        timestamp = %chrono::Utc::now().to_rfc3339(),
        "API usage"
    );
}
