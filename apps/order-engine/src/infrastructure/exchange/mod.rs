//! Exchange adapters implementing `ExchangePort`.

pub mod bybit;
mod simulated;

pub use bybit::{BybitConfig, BybitExchangeAdapter, BybitError};
pub use simulated::SimulatedExchange;
