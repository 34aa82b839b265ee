//! Exchange Port (Driven Port)
//!
//! Interface for placing, cancelling and querying orders and positions on a
//! derivatives exchange. Every call is bounded by a network timeout; a
//! timeout is a failure, never an implicit success.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::{OrderStatus, OrderType, TimeInForce};
use crate::domain::recovery::ExchangePosition;
use crate::domain::shared::{ClientOrderId, ExchangeOrderId, Side, Symbol};

/// Instrument category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// USDT/USDC margined perpetuals and futures.
    #[default]
    Linear,
    /// Coin margined contracts.
    Inverse,
    /// Spot.
    Spot,
    /// Options.
    Option,
}

impl Category {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Inverse => "inverse",
            Self::Spot => "spot",
            Self::Option => "option",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Self::Linear),
            "inverse" => Ok(Self::Inverse),
            "spot" => Ok(Self::Spot),
            "option" => Ok(Self::Option),
            other => Err(ExchangeError::InvalidResponse {
                message: format!("unknown category '{other}'"),
            }),
        }
    }
}

/// Request to place an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    /// Instrument category.
    pub category: Category,
    /// Instrument.
    pub symbol: Symbol,
    /// Order side.
    pub side: Side,
    /// Order type.
    pub order_type: OrderType,
    /// Quantity.
    pub quantity: Decimal,
    /// Limit price for limit orders.
    pub price: Option<Decimal>,
    /// Trigger price for conditional orders.
    pub trigger_price: Option<Decimal>,
    /// Time in force.
    pub time_in_force: Option<TimeInForce>,
    /// Only reduce an existing position.
    pub reduce_only: bool,
    /// Client order id, used by the exchange to deduplicate submissions.
    pub client_order_id: ClientOrderId,
}

/// Exchange acknowledgement of a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderAck {
    /// Exchange-assigned id.
    pub order_id: ExchangeOrderId,
    /// Client id echoed back.
    pub client_order_id: ClientOrderId,
}

/// State of an order as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeOrderState {
    /// Exchange-assigned id.
    pub order_id: ExchangeOrderId,
    /// Client id, if one was supplied.
    pub client_order_id: Option<ClientOrderId>,
    /// Instrument.
    pub symbol: Symbol,
    /// Order side.
    pub side: Side,
    /// Mapped status.
    pub status: OrderStatus,
    /// Requested quantity.
    pub quantity: Decimal,
    /// Cumulative filled quantity.
    pub filled_quantity: Decimal,
    /// Average fill price, if any fills.
    pub avg_fill_price: Option<Decimal>,
    /// Rejection or cancellation detail.
    pub reason: Option<String>,
}

/// Top of book and reference prices for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
    /// Last traded price.
    pub last: Decimal,
    /// Mark price.
    pub mark: Decimal,
}

impl Ticker {
    /// Price a market order on `side` is expected to fill at.
    ///
    /// Ask for buys, bid for sells, falling back to the last trade. Returns
    /// `None` if no positive price is available.
    #[must_use]
    pub fn reference_price(&self, side: Side) -> Option<Decimal> {
        let quote = match side {
            Side::Buy => self.ask,
            Side::Sell => self.bid,
        };
        [quote, self.last]
            .into_iter()
            .find(|price| *price > Decimal::ZERO)
    }
}

/// Exchange port error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    /// The call did not complete within the network timeout.
    #[error("Exchange call timed out: {operation}")]
    Timeout {
        /// Operation that timed out.
        operation: String,
    },

    /// Transport-level failure.
    #[error("Exchange connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// The exchange answered with a non-zero result code.
    #[error("Exchange rejected request ({code}): {message}")]
    Rejected {
        /// Exchange result code.
        code: i64,
        /// Exchange message.
        message: String,
    },

    /// Rate limited by the exchange.
    #[error("Rate limited by exchange")]
    RateLimited,

    /// Credentials missing or refused.
    #[error("Exchange authentication failed: {message}")]
    Authentication {
        /// Error details.
        message: String,
    },

    /// Response could not be understood.
    #[error("Invalid exchange response: {message}")]
    InvalidResponse {
        /// Error details.
        message: String,
    },
}

impl ExchangeError {
    /// Transient failures that a background loop should simply retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Connection { .. } | Self::RateLimited
        )
    }
}

/// Port for exchange interactions.
#[async_trait]
pub trait ExchangePort: Send + Sync {
    /// Place an order.
    async fn place_order(&self, request: PlaceOrderRequest)
    -> Result<PlaceOrderAck, ExchangeError>;

    /// Cancel one order.
    async fn cancel_order(
        &self,
        category: Category,
        symbol: &Symbol,
        order_id: &ExchangeOrderId,
    ) -> Result<(), ExchangeError>;

    /// Cancel all open orders, optionally for one symbol. Returns the cancelled ids.
    async fn cancel_all_orders(
        &self,
        category: Category,
        symbol: Option<&Symbol>,
    ) -> Result<Vec<ExchangeOrderId>, ExchangeError>;

    /// Query order states, optionally narrowed to one order.
    ///
    /// Recently closed orders are included so callers can observe fills.
    async fn get_open_orders(
        &self,
        category: Category,
        symbol: &Symbol,
        order_id: Option<&ExchangeOrderId>,
    ) -> Result<Vec<ExchangeOrderState>, ExchangeError>;

    /// Query an order by client id.
    async fn get_order_by_client_id(
        &self,
        category: Category,
        symbol: &Symbol,
        client_order_id: &ClientOrderId,
    ) -> Result<Option<ExchangeOrderState>, ExchangeError>;

    /// Open positions with non-zero size.
    async fn get_positions(
        &self,
        category: Category,
        settle_coin: Option<&str>,
    ) -> Result<Vec<ExchangePosition>, ExchangeError>;

    /// Reference prices for an instrument.
    async fn get_ticker(&self, category: Category, symbol: &Symbol)
    -> Result<Ticker, ExchangeError>;
}
