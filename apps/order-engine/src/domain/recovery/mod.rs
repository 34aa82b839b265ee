//! Recovery Bounded Context
//!
//! Durable strategy state, the exchange's view of positions, and the
//! snapshot that drives auto-restart after a crash.

mod position;
mod snapshot;
mod strategy;

pub use position::ExchangePosition;
pub use snapshot::{BotConfig, RecoverySnapshot, RestartPolicy};
pub use strategy::{
    ActiveStrategy, StopLossParams, StrategyKind, StrategyParams, TakeProfitParams,
    TrailingStopParams,
};
