use std::sync::Arc;

use crate::auth::KeyValidator;
use crate::config::Config;
use crate::gateway::ServiceClient;
use crate::rate_limit::RateLimiterRegistry;

/// Application context containing shared dependencies.
/// One instance lives for the process lifetime and is shared by reference
/// across requests; per-request state never lands here.
pub struct AppContext {
    pub config: Arc<Config>,
    pub validator: KeyValidator,
    pub rate_limiter: RateLimiterRegistry,
    pub service_client: ServiceClient,
}

impl AppContext {
    pub fn new(config: Arc<Config>) -> Self {
        let service_client = ServiceClient::new(config.backend_timeout_secs);
        let validator = KeyValidator::new(&config, service_client.inner());
        let rate_limiter = RateLimiterRegistry::new(config.rate_limit_data_dir.clone());

        Self {
            config,
            validator,
            rate_limiter,
            service_client,
        }
    }
}
