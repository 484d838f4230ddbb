// ============================================================================
// Service Client
// ============================================================================
//
// HTTP client for proxying requests to the backends. Connection pooling and
// keep-alive are tuned for the per-request latency budget at the edge; the
// gateway performs no retries of its own, so any network failure surfaces
// to the dispatcher as an upstream error.
//
// ============================================================================

use axum::body::Body;
use axum::http::{HeaderMap, Method, Response};
use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};

/// Pooled HTTP client shared by the dispatcher and the key validator.
pub struct ServiceClient {
    client: reqwest::Client,
}

impl ServiceClient {
    pub fn new(timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// The underlying reqwest client, for collaborators that build their own
    /// requests (the key validator's internal channel).
    pub fn inner(&self) -> reqwest::Client {
        self.client.clone()
    }

    /// Send one request to a backend and return the raw reqwest response.
    pub async fn send(
        &self,
        method: Method,
        target_url: &str,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> GatewayResult<reqwest::Response> {
        let mut request = self.client.request(method, target_url).headers(headers);
        if !body.is_empty() {
            request = request.body(body);
        }
        request.send().await.map_err(GatewayError::from)
    }

    /// Convert a backend response into an axum response byte-for-byte:
    /// same status, same headers, same body.
    pub async fn passthrough_response(
        response: reqwest::Response,
    ) -> GatewayResult<Response<Body>> {
        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response.bytes().await.map_err(GatewayError::from)?;

        let mut builder = Response::builder().status(status);
        for (key, value) in headers.iter() {
            builder = builder.header(key, value);
        }
        builder
            .body(Body::from(body_bytes))
            .map_err(|e| GatewayError::internal(format!("failed to build response: {}", e)))
    }
}
