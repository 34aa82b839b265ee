//! Order status, type and time-in-force.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Order status in the lifecycle.
///
/// `Pending -> {PartiallyFilled -> Filled, Cancelled, Rejected}`, with
/// `Pending -> Filled` directly for market orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Submitted, not yet filled.
    Pending,
    /// Some quantity filled.
    PartiallyFilled,
    /// Fully filled.
    Filled,
    /// Cancelled before a full fill.
    Cancelled,
    /// Rejected by the exchange.
    Rejected,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    /// Map an exchange order status string.
    ///
    /// Unknown strings map to `Pending` so the monitor keeps polling them.
    #[must_use]
    pub fn from_exchange(status: &str) -> Self {
        match status {
            "PartiallyFilled" => Self::PartiallyFilled,
            "Filled" => Self::Filled,
            "Cancelled" | "PartiallyFilledCanceled" | "Deactivated" => Self::Cancelled,
            "Rejected" => Self::Rejected,
            _ => Self::Pending,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::PartiallyFilled => "PartiallyFilled",
            Self::Filled => "Filled",
            Self::Cancelled => "Cancelled",
            Self::Rejected => "Rejected",
        };
        f.write_str(s)
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Market order.
    Market,
    /// Limit order.
    Limit,
    /// Conditional market order that fires when price moves against the position.
    StopMarket,
    /// Conditional market order that fires when price reaches the profit target.
    TakeProfitMarket,
}

impl OrderType {
    /// Whether this order type needs a limit price.
    #[must_use]
    pub const fn requires_limit_price(&self) -> bool {
        matches!(self, Self::Limit)
    }

    /// Whether this order type needs a trigger price.
    #[must_use]
    pub const fn requires_trigger_price(&self) -> bool {
        matches!(self, Self::StopMarket | Self::TakeProfitMarket)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Market => "Market",
            Self::Limit => "Limit",
            Self::StopMarket => "StopMarket",
            Self::TakeProfitMarket => "TakeProfitMarket",
        };
        f.write_str(s)
    }
}

/// Time in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good till cancelled.
    #[default]
    #[serde(rename = "GTC")]
    GoodTillCancel,
    /// Immediate or cancel.
    #[serde(rename = "IOC")]
    ImmediateOrCancel,
    /// Fill or kill.
    #[serde(rename = "FOK")]
    FillOrKill,
    /// Maker only.
    PostOnly,
}

impl TimeInForce {
    /// Exchange wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GoodTillCancel => "GTC",
            Self::ImmediateOrCancel => "IOC",
            Self::FillOrKill => "FOK",
            Self::PostOnly => "PostOnly",
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
