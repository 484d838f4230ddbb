// ============================================================================
// API Key Validator
// ============================================================================
//
// Resolves bearer API keys to their metadata. Malformed tokens are rejected
// without any network or storage access. Well-formed tokens hit a TTL cache
// keyed by a salted digest of the token (never the plaintext); misses call
// the owning application's internal validation endpoint over the shared
// secret channel.
//
// The cache is advisory: a revoked key may remain accepted for up to one TTL
// window. This component resolves identity and metadata only; authorization
// happens in the router.
//
// ============================================================================

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, KEY_PREFIX, MIN_KEY_LENGTH};
use crate::error::{GatewayError, GatewayResult};
use crate::instance::AllowedInstance;

/// API key metadata as returned by the application's validation endpoint.
/// Immutable within a single request; refreshed only through cache expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyData {
    pub id: String,
    /// Null for orphan keys that were never claimed by an organization
    pub organization_id: Option<String>,
    /// Default instance when the request carries no "from" reference
    pub instance_id: Option<String>,
    /// Credential for the default instance
    pub provider_token: String,
    pub scopes: Vec<String>,
    pub rate_limit_requests: u32,
    pub rate_limit_window_seconds: u32,
    pub is_active: bool,
    #[serde(default)]
    pub allowed_instances: Vec<AllowedInstance>,
}

pub struct KeyValidator {
    cache: Cache<String, Arc<ApiKeyData>>,
    client: reqwest::Client,
    app_url: String,
    internal_secret: String,
}

impl KeyValidator {
    pub fn new(config: &Config, client: reqwest::Client) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.key_cache_capacity)
            .time_to_live(Duration::from_secs(config.key_cache_ttl_secs))
            .build();
        Self {
            cache,
            client,
            app_url: config.app_url.clone(),
            internal_secret: config.internal_secret.clone(),
        }
    }

    /// Fast textual shape check. Anything failing this never leaves the process.
    pub fn token_shape_ok(token: &str) -> bool {
        token.starts_with(KEY_PREFIX) && token.len() >= MIN_KEY_LENGTH
    }

    /// Resolve a raw token to its metadata, or `None` for an unknown key.
    ///
    /// A transient failure of the validation endpoint is a distinguishable
    /// error, never silently treated as "invalid key".
    pub async fn validate(&self, token: &str) -> GatewayResult<Option<Arc<ApiKeyData>>> {
        if !Self::token_shape_ok(token) {
            return Ok(None);
        }

        let cache_key = cache_key(token);
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(Some(cached));
        }

        let response = self
            .client
            .post(format!("{}/api/internal/validate-key", self.app_url))
            .header("X-Internal-Secret", &self.internal_secret)
            .json(&serde_json::json!({ "key": token }))
            .send()
            .await
            .map_err(|e| GatewayError::InternalAuth(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::NOT_FOUND
        {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(GatewayError::InternalAuth(format!(
                "validation endpoint returned {}",
                status
            )));
        }

        let data: ApiKeyData = response
            .json()
            .await
            .map_err(|e| GatewayError::InternalAuth(format!("malformed validation response: {}", e)))?;

        let data = Arc::new(data);
        self.cache.insert(cache_key, data.clone()).await;

        Ok(Some(data))
    }
}

/// Cache key: short plaintext prefix plus a truncated SHA-256 digest. The
/// prefix aids debugging; the digest keeps the full token out of the cache.
fn cache_key(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut hash_hex = String::with_capacity(16);
    for byte in &digest[..8] {
        hash_hex.push_str(&format!("{:02x}", byte));
    }
    let prefix: String = token.chars().take(16).collect();
    format!("apikey:{}:{}", prefix, hash_hex)
}
