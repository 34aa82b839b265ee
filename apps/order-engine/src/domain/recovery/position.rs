//! Positions as reported by the exchange.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{PairKey, Side, Symbol};

/// An open position reported by the exchange.
///
/// This is the reconciliation ground truth: local state for any pair not
/// in the current set of positions is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangePosition {
    /// Instrument.
    pub symbol: Symbol,
    /// Position side.
    pub side: Side,
    /// Absolute position size.
    pub size: Decimal,
    /// Average entry price.
    pub avg_price: Decimal,
    /// Current mark price.
    pub mark_price: Decimal,
    /// Unrealized profit and loss.
    pub unrealized_pnl: Decimal,
}

impl ExchangePosition {
    /// The (symbol, side) pair of this position.
    #[must_use]
    pub fn key(&self) -> PairKey {
        PairKey::new(self.symbol.clone(), self.side)
    }
}
