//! HTTP request DTOs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::recovery::{BotConfig, StrategyParams};
use crate::domain::shared::Side;

/// Request to open a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterPositionRequest {
    /// Instrument.
    pub symbol: String,
    /// Position side.
    pub side: Side,
    /// Position size.
    pub size: Decimal,
    /// Exit strategy; a trailing stop at the default distance if absent.
    #[serde(default)]
    pub strategy: Option<StrategyParams>,
}

/// Request to reduce or close a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitPositionRequest {
    /// Instrument.
    pub symbol: String,
    /// Quantity to close; the whole position if absent.
    #[serde(default)]
    pub size: Option<Decimal>,
}

/// Notification that the bot started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotStartedRequest {
    /// Configuration the bot runs with.
    pub config: BotConfig,
    /// Started by an operator rather than by auto-restart.
    #[serde(default = "default_manual")]
    pub manual: bool,
}

const fn default_manual() -> bool {
    true
}

/// Query for cancel-all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAllQuery {
    /// Restrict to one instrument.
    #[serde(default)]
    pub symbol: Option<String>,
}
