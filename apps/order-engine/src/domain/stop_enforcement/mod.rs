//! Stop Enforcement Bounded Context
//!
//! Trailing stops and fixed take-profit / stop-loss trigger levels.

mod levels;
mod trailing_stop;

pub use levels::{is_stop_loss_hit, is_take_profit_hit};
pub use trailing_stop::{StopUpdate, TrailingStop};
