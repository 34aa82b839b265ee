//! Bybit v5 API request and response types.
//!
//! Bybit encodes every number as a string; conversion to `Decimal` happens in
//! the adapter.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::BybitError;

// ============================================================================
// Envelope
// ============================================================================

/// Common response envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitEnvelope {
    pub ret_code: i64,
    #[serde(default)]
    pub ret_msg: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

/// Paged list wrapper used by list endpoints.
#[derive(Debug, Deserialize)]
pub struct BybitList<T> {
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
}

// ============================================================================
// Requests
// ============================================================================

/// Body for `POST /v5/order/create`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitCreateOrderRequest<'a> {
    pub category: &'a str,
    pub symbol: &'a str,
    pub side: &'a str,
    pub order_type: &'a str,
    pub qty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_direction: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<&'a str>,
    pub reduce_only: bool,
    pub order_link_id: &'a str,
}

/// Body for `POST /v5/order/cancel`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitCancelOrderRequest<'a> {
    pub category: &'a str,
    pub symbol: &'a str,
    pub order_id: &'a str,
}

/// Body for `POST /v5/order/cancel-all`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitCancelAllRequest<'a> {
    pub category: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settle_coin: Option<&'a str>,
}

// ============================================================================
// Responses
// ============================================================================

/// Result of order create.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitOrderIdResult {
    pub order_id: String,
    #[serde(default)]
    pub order_link_id: String,
}

/// Order entry from `GET /v5/order/realtime`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitOrderItem {
    pub order_id: String,
    #[serde(default)]
    pub order_link_id: String,
    pub symbol: String,
    pub side: String,
    pub order_status: String,
    #[serde(default)]
    pub qty: String,
    #[serde(default)]
    pub cum_exec_qty: String,
    #[serde(default)]
    pub avg_price: String,
    #[serde(default)]
    pub reject_reason: String,
}

/// Position entry from `GET /v5/position/list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitPositionItem {
    pub symbol: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub avg_price: String,
    #[serde(default)]
    pub mark_price: String,
    #[serde(default)]
    pub unrealised_pnl: String,
}

/// Ticker entry from `GET /v5/market/tickers`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitTickerItem {
    pub symbol: String,
    #[serde(default)]
    pub bid1_price: String,
    #[serde(default)]
    pub ask1_price: String,
    #[serde(default)]
    pub last_price: String,
    #[serde(default)]
    pub mark_price: String,
}

/// Parse a Bybit numeric string. Empty strings are zero.
pub fn parse_decimal(field: &str, value: &str) -> Result<Decimal, BybitError> {
    if value.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(value).map_err(|_| BybitError::InvalidField {
        field: field.to_string(),
        value: value.to_string(),
    })
}
