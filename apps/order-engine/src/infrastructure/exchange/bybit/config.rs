//! Bybit adapter configuration.

use std::time::Duration;

/// Mainnet REST endpoint.
pub const MAINNET_URL: &str = "https://api.bybit.com";

/// Testnet REST endpoint.
pub const TESTNET_URL: &str = "https://api-testnet.bybit.com";

/// Configuration for the Bybit exchange adapter.
#[derive(Debug, Clone)]
pub struct BybitConfig {
    /// API key.
    pub api_key: String,
    /// API secret.
    pub api_secret: String,
    /// REST base URL without a trailing slash.
    pub base_url: String,
    /// Signature validity window in milliseconds.
    pub recv_window_ms: u64,
    /// Network timeout applied to every request.
    pub timeout: Duration,
    /// Retry policy for read-only requests.
    pub retry: RetryConfig,
}

impl BybitConfig {
    /// Create a configuration with default timeouts.
    #[must_use]
    pub fn new(api_key: String, api_secret: String, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            api_secret,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            recv_window_ms: 5000,
            timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
        }
    }

    /// Set the network timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry configuration.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the receive window.
    #[must_use]
    pub const fn with_recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = recv_window_ms;
        self
    }

    /// Whether this points at the testnet.
    #[must_use]
    pub fn is_testnet(&self) -> bool {
        self.base_url.contains("testnet")
    }
}

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}
