//! Order execution configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::application::ports::Category;
use crate::application::{ExecutionSettings, OrderMonitorConfig};

/// Order execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Minimum spacing between order submissions in milliseconds.
    #[serde(default = "default_min_order_interval_ms")]
    pub min_order_interval_ms: u64,
    /// Slippage above which a warning is logged (0.005 = 0.5%).
    #[serde(default = "default_max_acceptable_slippage")]
    pub max_acceptable_slippage: Decimal,
    /// Order monitor poll interval in seconds.
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    /// Order monitor delay after a failed poll in seconds.
    #[serde(default = "default_monitor_error_backoff_secs")]
    pub monitor_error_backoff_secs: u64,
    /// Terminal orders kept in memory.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            min_order_interval_ms: default_min_order_interval_ms(),
            max_acceptable_slippage: default_max_acceptable_slippage(),
            monitor_interval_secs: default_monitor_interval_secs(),
            monitor_error_backoff_secs: default_monitor_error_backoff_secs(),
            history_limit: default_history_limit(),
        }
    }
}

impl ExecutionConfig {
    /// Engine settings for orders placed in `category`.
    #[must_use]
    pub const fn to_settings(&self, category: Category) -> ExecutionSettings {
        ExecutionSettings {
            category,
            min_order_interval: Duration::from_millis(self.min_order_interval_ms),
            max_acceptable_slippage: self.max_acceptable_slippage,
            history_limit: self.history_limit,
        }
    }

    /// Order monitor timing.
    #[must_use]
    pub const fn to_monitor_config(&self) -> OrderMonitorConfig {
        OrderMonitorConfig {
            interval: Duration::from_secs(self.monitor_interval_secs),
            error_backoff: Duration::from_secs(self.monitor_error_backoff_secs),
        }
    }
}

const fn default_min_order_interval_ms() -> u64 {
    100
}

fn default_max_acceptable_slippage() -> Decimal {
    dec!(0.005)
}

const fn default_monitor_interval_secs() -> u64 {
    1
}

const fn default_monitor_error_backoff_secs() -> u64 {
    5
}

const fn default_history_limit() -> usize {
    1000
}
