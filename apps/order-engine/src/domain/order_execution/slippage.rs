//! Slippage calculation.

use rust_decimal::Decimal;

use crate::domain::shared::Side;

/// Signed relative slippage between the expected and the actual fill price.
///
/// Positive values are adverse for either side: a buy filled above the
/// reference or a sell filled below it. Returns `None` if the reference
/// price is not positive.
#[must_use]
pub fn slippage(side: Side, expected_price: Decimal, fill_price: Decimal) -> Option<Decimal> {
    if expected_price <= Decimal::ZERO {
        return None;
    }
    let diff = match side {
        Side::Buy => fill_price - expected_price,
        Side::Sell => expected_price - fill_price,
    };
    diff.checked_div(expected_price)
}
