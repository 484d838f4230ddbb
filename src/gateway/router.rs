// ============================================================================
// Gateway Router
// ============================================================================
//
// Holds the static route table mapping the public API surface to backend
// endpoints, and dispatches authenticated requests:
//
// - /v1/*        -> automation engine (bearer, transformed)
// - /webhooks/*  -> application (bypass, pass-through)
// - /internal/*  -> application (shared secret, pass-through)
//
// The table is built once at first use and never mutated, so dispatch has
// no synchronization concerns.
//
// ============================================================================

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Response};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

use crate::auth::ApiKeyData;
use crate::context::AppContext;
use crate::error::{GatewayError, GatewayResult};
use crate::instance::resolve_instance;
use crate::transform::{to_camel, to_pascal};

/// Which backend a route proxies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// The WhatsApp automation engine
    Automation,
    /// The primary application
    Application,
}

/// How a route authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Bearer API key (the default for the public surface)
    Bearer,
    /// No authentication (webhook receivers)
    Bypass,
    /// Shared secret header, compared by the pipeline
    InternalSecret,
}

/// One entry of the static route table.
#[derive(Debug, Clone, Copy)]
pub struct RouteConfig {
    pub backend: Backend,
    /// Backend-side path the public path maps to
    pub path: &'static str,
    pub methods: &'static [&'static str],
    pub auth: AuthMode,
    /// Pass bodies through verbatim instead of case-transforming them
    pub skip_transform: bool,
}

const fn automation(path: &'static str, methods: &'static [&'static str]) -> RouteConfig {
    RouteConfig {
        backend: Backend::Automation,
        path,
        methods,
        auth: AuthMode::Bearer,
        skip_transform: false,
    }
}

const fn webhook(path: &'static str) -> RouteConfig {
    RouteConfig {
        backend: Backend::Application,
        path,
        methods: &["GET", "POST"],
        auth: AuthMode::Bypass,
        skip_transform: true,
    }
}

const fn internal(path: &'static str, methods: &'static [&'static str]) -> RouteConfig {
    RouteConfig {
        backend: Backend::Application,
        path,
        methods,
        auth: AuthMode::InternalSecret,
        skip_transform: true,
    }
}

/// Public path -> route mapping. Every path served by the gateway has
/// exactly one entry here.
static ROUTES: Lazy<HashMap<&'static str, RouteConfig>> = Lazy::new(|| {
    HashMap::from([
        // ============ Messages ============
        ("/v1/messages/send", automation("/chat/send/text", &["POST"])),
        (
            "/v1/messages/send/image",
            automation("/chat/send/image", &["POST"]),
        ),
        (
            "/v1/messages/send/document",
            automation("/chat/send/document", &["POST"]),
        ),
        (
            "/v1/messages/send/audio",
            automation("/chat/send/audio", &["POST"]),
        ),
        (
            "/v1/messages/send/video",
            automation("/chat/send/video", &["POST"]),
        ),
        (
            "/v1/messages/send/location",
            automation("/chat/send/location", &["POST"]),
        ),
        (
            "/v1/messages/send/contact",
            automation("/chat/send/contact", &["POST"]),
        ),
        (
            "/v1/messages/send/sticker",
            automation("/chat/send/sticker", &["POST"]),
        ),
        ("/v1/messages/react", automation("/chat/react", &["POST"])),
        ("/v1/messages/read", automation("/chat/markread", &["POST"])),
        // ============ Contacts ============
        ("/v1/contacts/check", automation("/user/check", &["POST"])),
        ("/v1/contacts/info", automation("/user/info", &["POST"])),
        ("/v1/contacts/avatar", automation("/user/avatar", &["GET"])),
        ("/v1/contacts/list", automation("/user/contacts", &["GET"])),
        // ============ Session ============
        ("/v1/session/status", automation("/session/status", &["GET"])),
        ("/v1/session/qr", automation("/session/qr", &["GET"])),
        (
            "/v1/session/connect",
            automation("/session/connect", &["POST"]),
        ),
        (
            "/v1/session/disconnect",
            automation("/session/disconnect", &["POST"]),
        ),
        ("/v1/session/logout", automation("/session/logout", &["POST"])),
        // ============ Webhook configuration ============
        ("/v1/webhook", automation("/webhook", &["GET", "POST"])),
        // ============ Groups ============
        ("/v1/groups/list", automation("/group/list", &["GET"])),
        ("/v1/groups/info", automation("/group/info", &["GET"])),
        ("/v1/groups/create", automation("/group/create", &["POST"])),
        (
            "/v1/groups/invite-link",
            automation("/group/invitelink", &["GET"]),
        ),
        // ============ Inbound webhooks (no auth, pass-through) ============
        ("/webhooks/wuzapi", webhook("/api/webhooks/wuzapi")),
        ("/webhooks/clerk", webhook("/api/webhooks/clerk")),
        ("/webhooks/abacate", webhook("/api/webhooks/abacate")),
        // ============ Internal ============
        (
            "/internal/validate-key",
            internal("/api/internal/validate-key", &["POST"]),
        ),
    ])
});

/// Look up the route for a public path.
pub fn get_route(path: &str) -> Option<&'static RouteConfig> {
    ROUTES.get(path)
}

/// Whether a path goes through the bearer pipeline. Bypass routes and the
/// health endpoints do not; internal-secret routes and every unknown path do.
pub fn requires_auth(path: &str) -> bool {
    match get_route(path) {
        Some(route) => route.auth != AuthMode::Bypass,
        None => path != "/" && path != "/health",
    }
}

/// Required scope is "whatsapp:" plus the path's second segment
/// ("/v1/messages/send" -> "whatsapp:messages"). This mapping is part of the
/// public authorization contract and is kept verbatim; a path with fewer
/// segments yields a scope no key carries.
pub fn required_scope(path: &str) -> String {
    let segment = path.split('/').nth(2).unwrap_or("");
    format!("whatsapp:{}", segment)
}

fn has_scope(scopes: &[String], required: &str) -> bool {
    scopes
        .iter()
        .any(|s| s == "whatsapp:*" || s == "*" || s == required)
}

// ============================================================================
// Dispatch
// ============================================================================

/// Proxy an authenticated request to its backend.
///
/// Resolves the target route, enforces method and scope, resolves the
/// instance credential from a body-level "from" reference, transforms the
/// body to the backend's PascalCase format, and transforms JSON responses
/// back to camelCase. Backend business errors (non-2xx) are proxied
/// verbatim, not converted to gateway errors.
pub async fn dispatch(
    ctx: &AppContext,
    request: Request<Body>,
    key: &ApiKeyData,
) -> GatewayResult<Response<Body>> {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    let route = get_route(&path).ok_or_else(|| GatewayError::NotFound(path.clone()))?;

    if !route.methods.contains(&parts.method.as_str()) {
        return Err(GatewayError::MethodNotAllowed {
            method: parts.method.to_string(),
            path,
        });
    }

    let scope = required_scope(&path);
    if !has_scope(&key.scopes, &scope) {
        return Err(GatewayError::Forbidden(format!(
            "API key does not have required scope: {}",
            scope
        )));
    }

    let body_bytes = read_body(body, ctx.config.max_body_bytes).await?;

    let mut headers = outbound_headers(&parts.headers);
    let mut provider_token = key.provider_token.clone();
    let mut instance_id = key.instance_id.clone();
    let mut outbound_body = body_bytes.to_vec();

    // ============ Transform request: camelCase -> PascalCase ============
    let has_body = !matches!(parts.method, Method::GET | Method::HEAD) && !outbound_body.is_empty();
    if has_body && !route.skip_transform {
        // Non-JSON bodies pass through unchanged
        if let Ok(mut value) = serde_json::from_slice::<Value>(&outbound_body) {
            if let Some(obj) = value.as_object_mut() {
                // "from" selects the instance; it is gateway-level
                // addressing and is stripped before forwarding
                if let Some(from_value) = obj.remove("from") {
                    let from = from_value.as_str().unwrap_or_default().to_string();
                    match resolve_instance(&from, &key.allowed_instances) {
                        Some(instance) => {
                            provider_token = instance.provider_token.clone();
                            instance_id = Some(instance.id.clone());
                        }
                        None => {
                            return Err(GatewayError::Forbidden(format!(
                                "No authorized instance matches \"from\": {}",
                                from
                            )));
                        }
                    }
                }
            }
            outbound_body = serde_json::to_vec(&to_pascal(&value)).map_err(|e| {
                GatewayError::internal(format!("failed to serialize request body: {}", e))
            })?;
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }
    }

    // ============ Backend credential and tracing headers ============
    if route.backend == Backend::Automation {
        let token = HeaderValue::from_str(&provider_token)
            .map_err(|_| GatewayError::internal("provider token is not a valid header value"))?;
        headers.insert("Token", token);
    }
    insert_metadata_header(&mut headers, "X-API-Key-ID", &key.id)?;
    if let Some(org_id) = &key.organization_id {
        insert_metadata_header(&mut headers, "X-Organization-ID", org_id)?;
    }
    if let Some(inst_id) = &instance_id {
        insert_metadata_header(&mut headers, "X-Instance-ID", inst_id)?;
    }

    let target_url = target_url(ctx, route, parts.uri.query());

    let backend_response = ctx
        .service_client
        .send(parts.method, &target_url, headers, outbound_body)
        .await?;

    // ============ Transform response: PascalCase -> camelCase ============
    let status = backend_response.status();
    let response_headers = backend_response.headers().clone();
    let response_bytes = backend_response.bytes().await.map_err(GatewayError::from)?;

    let is_json = response_headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));

    if is_json && !route.skip_transform {
        if let Ok(value) = serde_json::from_slice::<Value>(&response_bytes) {
            let body = serde_json::to_vec(&to_camel(&value)).map_err(|e| {
                GatewayError::internal(format!("failed to serialize response body: {}", e))
            })?;
            return Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .map_err(|e| GatewayError::internal(format!("failed to build response: {}", e)));
        }
        // Parse failure: fall through and return the raw response
    }

    let mut builder = Response::builder().status(status);
    for (name, value) in response_headers.iter() {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(response_bytes))
        .map_err(|e| GatewayError::internal(format!("failed to build response: {}", e)))
}

/// Proxy a bypass or internal-secret request verbatim: route and method are
/// still validated, but no scope check, no rate limiting, and no body
/// transformation. Header hygiene still applies.
pub async fn dispatch_bypass(
    ctx: &AppContext,
    request: Request<Body>,
) -> GatewayResult<Response<Body>> {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    let route = get_route(&path).ok_or_else(|| GatewayError::NotFound(path.clone()))?;

    if !route.methods.contains(&parts.method.as_str()) {
        return Err(GatewayError::MethodNotAllowed {
            method: parts.method.to_string(),
            path,
        });
    }

    let body_bytes = read_body(body, ctx.config.max_body_bytes).await?;

    let headers = outbound_headers(&parts.headers);
    let target_url = target_url(ctx, route, parts.uri.query());

    let backend_response = ctx
        .service_client
        .send(parts.method, &target_url, headers, body_bytes.to_vec())
        .await?;

    crate::gateway::ServiceClient::passthrough_response(backend_response).await
}

/// Buffer the request body up to the configured ceiling. Overflow is a 413;
/// anything else reading the stream is a client-side failure.
async fn read_body(body: Body, limit: usize) -> GatewayResult<Bytes> {
    to_bytes(body, limit).await.map_err(|e| {
        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&e);
        while let Some(err) = source {
            if err.downcast_ref::<http_body_util::LengthLimitError>().is_some() {
                return GatewayError::PayloadTooLarge { limit };
            }
            source = err.source();
        }
        GatewayError::internal(format!("failed to read request body: {}", e))
    })
}

/// Copy inbound headers for forwarding, dropping the ones the gateway owns:
/// Host (reqwest sets it), Authorization (replaced by the backend
/// credential), Content-Length (recomputed for the rewritten body).
fn outbound_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if name == header::HOST || name == header::AUTHORIZATION || name == header::CONTENT_LENGTH
        {
            continue;
        }
        out.append(name, value.clone());
    }
    out
}

fn insert_metadata_header(
    headers: &mut HeaderMap,
    name: &'static str,
    value: &str,
) -> GatewayResult<()> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| GatewayError::internal(format!("{} is not a valid header value", name)))?;
    headers.insert(name, value);
    Ok(())
}

fn target_url(ctx: &AppContext, route: &RouteConfig, query: Option<&str>) -> String {
    let base = match route.backend {
        Backend::Automation => &ctx.config.automation_url,
        Backend::Application => &ctx.config.app_url,
    };
    match query {
        Some(query) => format!("{}{}?{}", base, route.path, query),
        None => format!("{}{}", base, route.path),
    }
}
