//! Bybit v5 Exchange Adapter
//!
//! Implementation of `ExchangePort` for the Bybit v5 unified REST API with:
//! - HMAC-SHA256 request signing
//! - Bounded network timeouts on every call
//! - Retry with exponential backoff and jitter for read-only requests
//!
//! Order placement and cancellation are never retried here. The execution
//! engine resolves ambiguous outcomes by querying the client order id.

mod adapter;
mod api_types;
mod config;
mod error;
mod http_client;

pub use adapter::BybitExchangeAdapter;
pub use config::{BybitConfig, MAINNET_URL, RetryConfig, TESTNET_URL};
pub use error::BybitError;
