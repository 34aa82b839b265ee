//! Fixed trigger levels.

use rust_decimal::Decimal;

use crate::domain::shared::Side;

/// Whether `price` reached a take-profit target for a position on `side`.
#[must_use]
pub fn is_take_profit_hit(side: Side, target: Decimal, price: Decimal) -> bool {
    match side {
        Side::Buy => price >= target,
        Side::Sell => price <= target,
    }
}

/// Whether `price` breached a stop-loss level for a position on `side`.
#[must_use]
pub fn is_stop_loss_hit(side: Side, stop: Decimal, price: Decimal) -> bool {
    match side {
        Side::Buy => price <= stop,
        Side::Sell => price >= stop,
    }
}
