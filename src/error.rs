use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use crate::config::DOCS_URL;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error taxonomy.
///
/// Every variant maps to a stable HTTP status and a JSON error envelope
/// `{"error": {"code": <status>, "message": <string>, ...}}`. Validation and
/// authorization failures terminate the pipeline immediately; backend business
/// errors are never represented here because non-2xx backend responses are
/// proxied verbatim to the caller.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// 401 - no bearer token or a malformed Authorization header
    #[error("Missing or invalid Authorization header")]
    AuthMissing,

    /// 401 - key unknown, revoked, or internal secret mismatch
    #[error("{0}")]
    AuthInvalid(String),

    /// 403 - scope mismatch or unresolved instance reference
    #[error("{0}")]
    Forbidden(String),

    /// 429 - sliding window exhausted
    #[error("Rate limit exceeded")]
    RateLimited {
        limit: u32,
        window_seconds: u32,
        reset_at: i64,
    },

    /// 404 - path has no route table entry
    #[error("Endpoint not found: {0}")]
    NotFound(String),

    /// 405 - route exists but does not accept this method
    #[error("Method {method} not allowed for {path}")]
    MethodNotAllowed { method: String, path: String },

    /// 413 - request body larger than the configured ceiling
    #[error("Request body exceeds the maximum size of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// 502 - backend unreachable or the fetch failed outright
    #[error("Upstream service error")]
    Upstream(String),

    /// 500 - the validator's own dependency failed; distinct from "key is invalid"
    #[error("Authentication service error")]
    InternalAuth(String),

    /// 500 - anything else that should never reach the caller in detail
    #[error("Internal server error")]
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::AuthMissing | GatewayError::AuthInvalid(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::InternalAuth(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Log this error with a level matching its severity
    pub fn log(&self) {
        let status = self.status_code();
        match self {
            GatewayError::Upstream(detail) => {
                tracing::error!(error = %self, detail = %detail, "Backend fetch failed");
            }
            GatewayError::InternalAuth(detail) => {
                tracing::error!(error = %self, detail = %detail, "Key validation dependency failed");
            }
            GatewayError::Internal(detail) => {
                tracing::error!(error = %self, detail = %detail, "Internal gateway error");
            }
            GatewayError::AuthMissing | GatewayError::AuthInvalid(_) => {
                tracing::warn!(error = %self, "Authentication failed");
            }
            _ => {
                tracing::debug!(error = %self, status = %status.as_u16(), "Client error");
            }
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        GatewayError::Internal(msg.into())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Upstream(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        self.log();

        let status = self.status_code();
        let mut error_obj = serde_json::Map::new();
        error_obj.insert("code".into(), json!(status.as_u16()));
        error_obj.insert("message".into(), json!(self.to_string()));

        // Contextual hints keep the public API self-documenting
        match &self {
            GatewayError::AuthMissing => {
                error_obj.insert(
                    "hint".into(),
                    json!("Use \"Authorization: Bearer lc_live_xxx\" header"),
                );
            }
            GatewayError::NotFound(_) => {
                error_obj.insert("docs".into(), json!(DOCS_URL));
            }
            GatewayError::RateLimited {
                limit,
                window_seconds,
                ..
            } => {
                error_obj.insert("limit".into(), json!(limit.to_string()));
                error_obj.insert("window".into(), json!(format!("{}s", window_seconds)));
            }
            _ => {}
        }

        let mut response =
            (status, axum::Json(json!({ "error": error_obj }))).into_response();

        if let GatewayError::RateLimited {
            limit, reset_at, ..
        } = &self
        {
            let now_ms = chrono::Utc::now().timestamp_millis();
            let retry_after_secs = ((reset_at - now_ms).max(0) + 999) / 1000;
            let headers = response.headers_mut();
            insert_header(headers, "X-RateLimit-Limit", &limit.to_string());
            insert_header(headers, "X-RateLimit-Remaining", "0");
            insert_header(headers, "X-RateLimit-Reset", &reset_at.to_string());
            insert_header(headers, "Retry-After", &retry_after_secs.to_string());
        }

        response
    }
}

fn insert_header(headers: &mut axum::http::HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = axum::http::HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
