//! HTTP response DTOs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::{PositionEntry, PositionExit, RecoveryState, RecoverySummary};
use crate::domain::order_execution::{Order, OrderStatus, OrderType, TimeInForce};
use crate::domain::recovery::{RecoverySnapshot, StrategyKind};
use crate::domain::shared::Side;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Application version.
    pub version: String,
    /// Recovery manager state.
    pub recovery_state: RecoveryState,
}

/// Error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub error: String,
}

/// An order as seen by API clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    /// Client order id.
    pub client_order_id: String,
    /// Exchange order id, once acknowledged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// Instrument.
    pub symbol: String,
    /// Side.
    pub side: Side,
    /// Order type.
    pub order_type: OrderType,
    /// Quantity.
    pub quantity: Decimal,
    /// Limit price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Reduce-only flag.
    pub reduce_only: bool,
    /// Status.
    pub status: OrderStatus,
    /// Filled quantity.
    pub filled_quantity: Decimal,
    /// Average fill price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_fill_price: Option<Decimal>,
    /// Reference price at submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_price: Option<Decimal>,
    /// Realized slippage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slippage: Option<Decimal>,
    /// Submission to acknowledgement latency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Rejection reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            client_order_id: order.client_order_id().to_string(),
            order_id: order.exchange_order_id().map(ToString::to_string),
            symbol: order.symbol().to_string(),
            side: order.side(),
            order_type: order.order_type(),
            quantity: order.quantity(),
            limit_price: order.limit_price(),
            time_in_force: order.time_in_force(),
            reduce_only: order.reduce_only(),
            status: order.status(),
            filled_quantity: order.filled_quantity(),
            avg_fill_price: order.avg_fill_price(),
            expected_price: order.expected_price(),
            slippage: order.slippage(),
            latency_ms: order.latency_ms(),
            reject_reason: order.reject_reason().map(str::to_string),
            created_at: order.created_at(),
        }
    }
}

/// Open orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdersResponse {
    /// Orders not yet terminal.
    pub orders: Vec<OrderResponse>,
}

/// Result of a single cancel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderResponse {
    /// Exchange order id.
    pub order_id: String,
    /// Cancelled by this call; false if it had already closed.
    pub cancelled: bool,
}

/// Result of cancel-all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAllResponse {
    /// Orders cancelled.
    pub cancelled: usize,
}

/// Result of entering a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterPositionResponse {
    /// Entry order.
    pub order: OrderResponse,
    /// Exit strategy recorded.
    pub strategy: StrategyKind,
    /// Entry price.
    pub entry_price: Decimal,
    /// Trailing stop price, for trailing strategies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
}

impl From<&PositionEntry> for EnterPositionResponse {
    fn from(entry: &PositionEntry) -> Self {
        Self {
            order: OrderResponse::from(&entry.order),
            strategy: entry.strategy.kind(),
            entry_price: entry.strategy.entry_price,
            stop_price: entry.trailing_stop.as_ref().map(|s| s.current_stop_price),
        }
    }
}

/// One closed leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitLegResponse {
    /// Instrument.
    pub symbol: String,
    /// Position side.
    pub side: Side,
    /// Position fully closed.
    pub fully_closed: bool,
    /// Closing order.
    pub order: OrderResponse,
}

impl From<&PositionExit> for ExitLegResponse {
    fn from(exit: &PositionExit) -> Self {
        Self {
            symbol: exit.pair.symbol.to_string(),
            side: exit.pair.side,
            fully_closed: exit.fully_closed,
            order: OrderResponse::from(&exit.order),
        }
    }
}

/// Result of exiting a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitPositionResponse {
    /// Legs reduced or closed.
    pub exits: Vec<ExitLegResponse>,
}

/// Bot run state after a lifecycle call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotStateResponse {
    /// Bot running.
    pub was_running: bool,
    /// Stopped by an operator.
    pub stopped_manually: bool,
    /// Automatic restart attempted.
    pub auto_restart_attempted: bool,
    /// Last automatic restart attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_attempt_time: Option<DateTime<Utc>>,
}

impl From<&RecoverySnapshot> for BotStateResponse {
    fn from(snapshot: &RecoverySnapshot) -> Self {
        Self {
            was_running: snapshot.was_running,
            stopped_manually: snapshot.stopped_manually,
            auto_restart_attempted: snapshot.auto_restart_attempted,
            restart_attempt_time: snapshot.restart_attempt_time,
        }
    }
}

/// Recovery manager status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryStatusResponse {
    /// Lifecycle state.
    pub state: RecoveryState,
    /// Last initial recovery summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_summary: Option<RecoverySummary>,
}
