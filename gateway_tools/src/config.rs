use std::time::Duration;

use storefront_common::Secret;

pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://api.razorpay.com";
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Scheme and host of the gateway API, e.g. "https://api.razorpay.com". The API version prefix is added by the
    /// client.
    pub base_url: String,
    /// The public key id. Safe to hand to browsers; checkout needs it.
    pub key_id: String,
    pub key_secret: Secret<String>,
    /// Upper bound for any single gateway call, connection set-up included.
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GATEWAY_BASE_URL.to_string(),
            key_id: String::default(),
            key_secret: Secret::default(),
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }
}

impl GatewayConfig {
    pub fn new(key_id: &str, key_secret: Secret<String>) -> Self {
        Self { key_id: key_id.to_string(), key_secret, ..Default::default() }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
