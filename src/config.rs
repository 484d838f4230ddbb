use anyhow::Result;
use std::path::PathBuf;

// ============================================================================
// Configuration Constants
// ============================================================================

// Default port value
const DEFAULT_PORT: u16 = 8080;

// Key metadata cache
pub const DEFAULT_KEY_CACHE_TTL_SECS: u64 = 300; // 5 minutes
const DEFAULT_KEY_CACHE_CAPACITY: u64 = 10_000;

// Backend fetch timeout. The gateway performs no retries itself; a timeout
// surfaces as 502 and the caller is expected to retry.
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;

// API key textual shape: "lc_live_" / "lc_test_" + 32 alphanumeric chars.
// The shape check must reject malformed tokens before any network access.
pub const KEY_PREFIX: &str = "lc_";
pub const MIN_KEY_LENGTH: usize = 20;

// Request body limit for proxied bodies. The media send routes carry
// base64 payloads through the gateway, so the default leaves them headroom;
// overflow is reported as 413, never silently truncated.
const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Public documentation URL, returned in health and 404 responses.
pub const DOCS_URL: &str = "https://docs.livchat.ai";

// ============================================================================
// Configuration Structure
// ============================================================================

#[derive(Clone, Debug)]
pub struct Config {
    /// Port the gateway listens on
    pub port: u16,
    /// Base URL of the WhatsApp automation backend (no trailing slash)
    pub automation_url: String,
    /// Base URL of the primary application backend (no trailing slash)
    pub app_url: String,
    /// Shared secret for the authenticated internal channel to the application
    pub internal_secret: String,
    /// Tracing filter directive (RUST_LOG)
    pub rust_log: String,
    /// TTL for cached API key metadata, in seconds
    pub key_cache_ttl_secs: u64,
    /// Maximum number of cached API key entries
    pub key_cache_capacity: u64,
    /// Timeout for backend fetches, in seconds
    pub backend_timeout_secs: u64,
    /// Maximum accepted request body size, in bytes
    pub max_body_bytes: usize,
    /// Directory holding the per-key rate limit databases
    pub rate_limit_data_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let internal_secret = std::env::var("INTERNAL_SECRET")
            .map_err(|_| anyhow::anyhow!("INTERNAL_SECRET must be set"))?;
        if internal_secret.trim().len() < 16 {
            anyhow::bail!(
                "INTERNAL_SECRET must be at least 16 characters long. \
                 Generate one with: openssl rand -base64 32"
            );
        }

        Ok(Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            automation_url: require_url("AUTOMATION_URL")?,
            app_url: require_url("APP_URL")?,
            internal_secret,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            key_cache_ttl_secs: std::env::var("KEY_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_KEY_CACHE_TTL_SECS),
            key_cache_capacity: std::env::var("KEY_CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_KEY_CACHE_CAPACITY),
            backend_timeout_secs: std::env::var("BACKEND_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_BACKEND_TIMEOUT_SECS),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_BODY_BYTES),
            rate_limit_data_dir: std::env::var("RATE_LIMIT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/rate-limits")),
        })
    }
}

/// Read a required base-URL variable and normalize away a trailing slash.
fn require_url(name: &str) -> Result<String> {
    let value = std::env::var(name).map_err(|_| anyhow::anyhow!("{} must be set", name))?;
    let trimmed = value.trim_end_matches('/');
    if trimmed.is_empty() {
        anyhow::bail!("{} must not be empty", name);
    }
    Ok(trimmed.to_string())
}
