//! Bot control-plane client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Control-plane configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// URL of the bot's start endpoint. Restarts fail when unset.
    #[serde(default)]
    pub bot_control_url: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bot_control_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ControlConfig {
    /// Configured URL; an empty interpolated value counts as unset.
    #[must_use]
    pub fn start_url(&self) -> Option<&str> {
        self.bot_control_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

const fn default_timeout_secs() -> u64 {
    10
}
