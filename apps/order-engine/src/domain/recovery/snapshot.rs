//! Recovery snapshot and the auto-restart policy.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{Side, Symbol};

/// Configuration the trading bot was last started with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Instrument the bot trades.
    pub symbol: Symbol,
    /// Order quantity.
    pub quantity: Decimal,
    /// Preferred side.
    pub side: Side,
    /// Indicator parameters, opaque to this service.
    #[serde(default)]
    pub indicator_params: BTreeMap<String, serde_json::Value>,
}

/// Persisted bot run state, read once at startup.
///
/// Rewritten on every transition: start, manual stop, restart attempt.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecoverySnapshot {
    /// Last configuration the bot ran with.
    pub bot_config: Option<BotConfig>,
    /// Bot was running when the snapshot was written.
    pub was_running: bool,
    /// Operator stopped the bot explicitly.
    pub stopped_manually: bool,
    /// An automatic restart was already attempted.
    pub auto_restart_attempted: bool,
    /// When the last automatic restart was attempted.
    pub restart_attempt_time: Option<DateTime<Utc>>,
}

impl RecoverySnapshot {
    /// Bot started with `config`.
    ///
    /// A manual start clears the restart-attempt flag. An automatic start
    /// keeps it so that a crash loop stays throttled.
    #[must_use]
    pub fn started(&self, config: BotConfig, manual: bool) -> Self {
        Self {
            bot_config: Some(config),
            was_running: true,
            stopped_manually: false,
            auto_restart_attempted: if manual { false } else { self.auto_restart_attempted },
            restart_attempt_time: if manual { None } else { self.restart_attempt_time },
        }
    }

    /// Operator stopped the bot.
    #[must_use]
    pub fn stopped_manually(&self) -> Self {
        Self {
            was_running: false,
            stopped_manually: true,
            ..self.clone()
        }
    }

    /// Automatic restart attempted at `now`.
    #[must_use]
    pub fn restart_attempted(&self, now: DateTime<Utc>) -> Self {
        Self {
            auto_restart_attempted: true,
            restart_attempt_time: Some(now),
            ..self.clone()
        }
    }
}

/// Decides whether the bot should be restarted after a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Auto-restart is enabled at all.
    pub enabled: bool,
    /// Minimum time between two automatic restart attempts.
    pub throttle: TimeDelta,
}

impl RestartPolicy {
    /// Minimum throttle window.
    pub const MIN_THROTTLE: TimeDelta = TimeDelta::minutes(2);

    /// Create a policy, clamping the throttle to at least two minutes.
    #[must_use]
    pub fn new(enabled: bool, throttle: TimeDelta) -> Self {
        Self {
            enabled,
            throttle: throttle.max(Self::MIN_THROTTLE),
        }
    }

    /// Evaluate the snapshot at `now`.
    #[must_use]
    pub fn should_restart(&self, snapshot: &RecoverySnapshot, now: DateTime<Utc>) -> bool {
        if !(snapshot.was_running && !snapshot.stopped_manually && self.enabled) {
            return false;
        }
        if snapshot.bot_config.is_none() {
            return false;
        }
        if !snapshot.auto_restart_attempted {
            return true;
        }
        snapshot
            .restart_attempt_time
            .is_none_or(|last| now - last >= self.throttle)
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::new(true, Self::MIN_THROTTLE)
    }
}
