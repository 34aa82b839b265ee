//! Crash recovery and reconciliation configuration.

use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::application::{PositionSource, RecoverySettings};
use crate::domain::recovery::RestartPolicy;

/// Minimum restart throttle in seconds.
pub const MIN_RESTART_THROTTLE_SECS: u64 = 120;

/// Recovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Run initial recovery and the monitoring loop.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Relaunch a bot that was running when the process died.
    #[serde(default = "default_true")]
    pub auto_restart_enabled: bool,
    /// Minimum seconds between automatic restart attempts.
    #[serde(default = "default_restart_throttle_secs")]
    pub restart_throttle_secs: u64,
    /// Seconds between monitoring ticks.
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    /// Extra seconds after a failed tick.
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_restart_enabled: true,
            restart_throttle_secs: default_restart_throttle_secs(),
            monitor_interval_secs: default_monitor_interval_secs(),
            error_backoff_secs: default_error_backoff_secs(),
        }
    }
}

impl RecoveryConfig {
    /// Manager settings querying `position_sources`.
    #[must_use]
    pub fn to_settings(&self, position_sources: Vec<PositionSource>) -> RecoverySettings {
        let throttle = i64::try_from(self.restart_throttle_secs)
            .map_or(TimeDelta::MAX, TimeDelta::seconds);
        RecoverySettings {
            position_sources,
            restart_policy: RestartPolicy::new(self.auto_restart_enabled, throttle),
            monitor_interval: Duration::from_secs(self.monitor_interval_secs),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_restart_throttle_secs() -> u64 {
    MIN_RESTART_THROTTLE_SECS
}

const fn default_monitor_interval_secs() -> u64 {
    30
}

const fn default_error_backoff_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = RecoveryConfig::default().to_settings(vec![PositionSource::default()]);
        assert!(settings.restart_policy.enabled);
        assert_eq!(settings.restart_policy.throttle, TimeDelta::minutes(2));
        assert_eq!(settings.monitor_interval, Duration::from_secs(30));
        assert_eq!(settings.error_backoff, Duration::from_secs(10));
    }

    #[test]
    fn longer_throttle_is_kept() {
        let config = RecoveryConfig {
            restart_throttle_secs: 600,
            ..RecoveryConfig::default()
        };
        let settings = config.to_settings(Vec::new());
        assert_eq!(settings.restart_policy.throttle, TimeDelta::minutes(10));
    }
}
