//! Trailing stop with a monotonic ratchet.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{DomainError, PairKey, Side, Symbol};

/// Outcome of feeding one price into a trailing stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopUpdate {
    /// Nothing changed.
    Hold,
    /// Best price and/or stop price moved in the favourable direction.
    Moved {
        /// Stop price before the move.
        previous_stop: Decimal,
        /// Stop price after the move.
        new_stop: Decimal,
    },
    /// Price crossed the stop; the position must be closed.
    Triggered {
        /// Stop price that was crossed.
        stop_price: Decimal,
        /// Price that crossed it.
        price: Decimal,
    },
}

/// A stop that follows favourable price movement and never retreats.
///
/// For a long (`Buy`) position `best_price` tracks the maximum and the stop
/// only moves up. For a short (`Sell`) position `best_price` tracks the
/// minimum and the stop only moves down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingStop {
    /// Instrument.
    pub symbol: Symbol,
    /// Position side.
    pub side: Side,
    /// Price at which the position is closed.
    pub current_stop_price: Decimal,
    /// Trail distance as a fraction of price (0.02 = 2%).
    pub trail_distance: Decimal,
    /// Most favourable price seen.
    pub best_price: Decimal,
    /// Last time the stop moved.
    pub updated_at: DateTime<Utc>,
}

impl TrailingStop {
    /// Arm a stop at `reference_price` offset by `trail_distance`.
    ///
    /// # Errors
    ///
    /// Returns error if the price is not positive or the distance is outside `(0, 1)`.
    pub fn new(
        symbol: Symbol,
        side: Side,
        reference_price: Decimal,
        trail_distance: Decimal,
    ) -> Result<Self, DomainError> {
        if reference_price <= Decimal::ZERO {
            return Err(DomainError::invalid_value(
                "reference_price",
                format!("must be positive, got {reference_price}"),
            ));
        }
        if trail_distance <= Decimal::ZERO || trail_distance >= Decimal::ONE {
            return Err(DomainError::invalid_value(
                "trail_distance",
                format!("must be in (0, 1), got {trail_distance}"),
            ));
        }

        Ok(Self {
            current_stop_price: stop_for(side, reference_price, trail_distance),
            symbol,
            side,
            trail_distance,
            best_price: reference_price,
            updated_at: Utc::now(),
        })
    }

    /// The (symbol, side) pair this stop protects.
    #[must_use]
    pub fn key(&self) -> PairKey {
        PairKey::new(self.symbol.clone(), self.side)
    }

    /// Feed a new mark price.
    pub fn on_price(&mut self, price: Decimal) -> StopUpdate {
        let previous_stop = self.current_stop_price;
        let improved = match self.side {
            Side::Buy => price > self.best_price,
            Side::Sell => price < self.best_price,
        };

        if improved {
            self.best_price = price;
            let candidate = stop_for(self.side, price, self.trail_distance);
            let tighter = match self.side {
                Side::Buy => candidate > self.current_stop_price,
                Side::Sell => candidate < self.current_stop_price,
            };
            if tighter {
                self.current_stop_price = candidate;
            }
            self.updated_at = Utc::now();
        }

        if self.is_breached(price) {
            return StopUpdate::Triggered {
                stop_price: self.current_stop_price,
                price,
            };
        }

        if improved {
            StopUpdate::Moved {
                previous_stop,
                new_stop: self.current_stop_price,
            }
        } else {
            StopUpdate::Hold
        }
    }

    /// Whether `price` is at or through the stop.
    #[must_use]
    pub fn is_breached(&self, price: Decimal) -> bool {
        match self.side {
            Side::Buy => price <= self.current_stop_price,
            Side::Sell => price >= self.current_stop_price,
        }
    }
}

fn stop_for(side: Side, price: Decimal, trail_distance: Decimal) -> Decimal {
    match side {
        Side::Buy => price * (Decimal::ONE - trail_distance),
        Side::Sell => price * (Decimal::ONE + trail_distance),
    }
}
