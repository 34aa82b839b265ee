//! Exchange connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::PositionSource;
use crate::application::ports::Category;
use crate::infrastructure::exchange::bybit::{BybitConfig, RetryConfig, TESTNET_URL};

/// Which exchange adapter to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeMode {
    /// Bybit v5 REST API.
    Bybit,
    /// In-process simulated exchange.
    #[default]
    Simulated,
}

/// Exchange configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Adapter selection.
    #[serde(default)]
    pub mode: ExchangeMode,
    /// REST base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key.
    #[serde(default)]
    pub api_key: String,
    /// API secret.
    #[serde(default)]
    pub api_secret: String,
    /// Signature receive window in milliseconds.
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Category orders are placed in.
    #[serde(default)]
    pub category: Category,
    /// Position queries used by recovery.
    #[serde(default = "default_position_categories")]
    pub position_categories: Vec<PositionSource>,
    /// Retry policy for read-only calls.
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            mode: ExchangeMode::default(),
            base_url: default_base_url(),
            api_key: String::new(),
            api_secret: String::new(),
            recv_window_ms: default_recv_window_ms(),
            timeout_secs: default_timeout_secs(),
            category: Category::default(),
            position_categories: default_position_categories(),
            retry: RetrySettings::default(),
        }
    }
}

impl ExchangeConfig {
    /// Both credentials are present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }

    /// Bybit adapter configuration.
    #[must_use]
    pub fn to_bybit_config(&self) -> BybitConfig {
        BybitConfig::new(
            self.api_key.clone(),
            self.api_secret.clone(),
            self.base_url.clone(),
        )
        .with_timeout(Duration::from_secs(self.timeout_secs))
        .with_recv_window(self.recv_window_ms)
        .with_retry(self.retry.to_retry_config())
    }
}

/// Retry policy for read-only exchange calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff cap in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Backoff growth factor.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetrySettings {
    /// Adapter retry configuration.
    #[must_use]
    pub const fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.multiplier,
        }
    }
}

fn default_base_url() -> String {
    TESTNET_URL.to_string()
}

const fn default_recv_window_ms() -> u64 {
    5000
}

const fn default_timeout_secs() -> u64 {
    10
}

fn default_position_categories() -> Vec<PositionSource> {
    vec![PositionSource::default()]
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    200
}

const fn default_max_backoff_ms() -> u64 {
    2000
}

const fn default_multiplier() -> f64 {
    2.0
}
