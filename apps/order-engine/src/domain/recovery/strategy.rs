//! Active strategies attached to open positions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{DomainError, PairKey, Side, Symbol};

/// Parameters of a trailing-stop strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingStopParams {
    /// Trail distance as a fraction of price.
    pub trail_distance: Decimal,
}

/// Parameters of a take-profit strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeProfitParams {
    /// Price at which profit is taken.
    pub target_price: Decimal,
}

/// Parameters of a stop-loss strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopLossParams {
    /// Price at which the loss is cut.
    pub stop_price: Decimal,
}

/// Strategy parameters, one variant per strategy kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyParams {
    /// Trailing stop.
    TrailingStop(TrailingStopParams),
    /// Fixed take-profit.
    TakeProfit(TakeProfitParams),
    /// Fixed stop-loss.
    StopLoss(StopLossParams),
}

impl StrategyParams {
    /// Trailing stop with the given distance.
    #[must_use]
    pub const fn trailing(trail_distance: Decimal) -> Self {
        Self::TrailingStop(TrailingStopParams { trail_distance })
    }

    /// Kind discriminator.
    #[must_use]
    pub const fn kind(&self) -> StrategyKind {
        match self {
            Self::TrailingStop(_) => StrategyKind::TrailingStop,
            Self::TakeProfit(_) => StrategyKind::TakeProfit,
            Self::StopLoss(_) => StrategyKind::StopLoss,
        }
    }
}

/// Strategy kind, stored as `strategy_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Trailing stop.
    TrailingStop,
    /// Fixed take-profit.
    TakeProfit,
    /// Fixed stop-loss.
    StopLoss,
}

impl StrategyKind {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TrailingStop => "trailing_stop",
            Self::TakeProfit => "take_profit",
            Self::StopLoss => "stop_loss",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trailing_stop" => Ok(Self::TrailingStop),
            "take_profit" => Ok(Self::TakeProfit),
            "stop_loss" => Ok(Self::StopLoss),
            other => Err(DomainError::invalid_value(
                "strategy_type",
                format!("unknown strategy kind '{other}'"),
            )),
        }
    }
}

/// Strategy managing an open position.
///
/// Created when a position is opened, deactivated (never deleted) when the
/// position closes or is found orphaned during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveStrategy {
    /// Instrument.
    pub symbol: Symbol,
    /// Position side.
    pub side: Side,
    /// Entry price.
    pub entry_price: Decimal,
    /// Entry time.
    pub entry_time: DateTime<Utc>,
    /// Strategy parameters.
    pub params: StrategyParams,
    /// Tracked position size.
    pub position_size: Decimal,
    /// Whether this row is the live one for its pair.
    pub is_active: bool,
}

impl ActiveStrategy {
    /// Create an active strategy entered now.
    #[must_use]
    pub fn new(
        symbol: Symbol,
        side: Side,
        entry_price: Decimal,
        position_size: Decimal,
        params: StrategyParams,
    ) -> Self {
        Self {
            symbol,
            side,
            entry_price,
            entry_time: Utc::now(),
            params,
            position_size,
            is_active: true,
        }
    }

    /// The (symbol, side) pair this strategy manages.
    #[must_use]
    pub fn key(&self) -> PairKey {
        PairKey::new(self.symbol.clone(), self.side)
    }

    /// Strategy kind.
    #[must_use]
    pub const fn kind(&self) -> StrategyKind {
        self.params.kind()
    }
}
