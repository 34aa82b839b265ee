//! Order Aggregate Root
//!
//! Tracks one order from submission until it reaches a terminal status.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderStateMachine, OrderStatus, OrderType, TimeInForce, slippage};
use crate::domain::shared::{ClientOrderId, ExchangeOrderId, Side, Symbol};

/// An order owned by the execution engine while in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    client_order_id: ClientOrderId,
    exchange_order_id: Option<ExchangeOrderId>,
    symbol: Symbol,
    side: Side,
    order_type: OrderType,
    quantity: Decimal,
    limit_price: Option<Decimal>,
    time_in_force: TimeInForce,
    reduce_only: bool,
    status: OrderStatus,
    filled_quantity: Decimal,
    avg_fill_price: Option<Decimal>,
    expected_price: Option<Decimal>,
    slippage: Option<Decimal>,
    latency_ms: Option<u64>,
    reject_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a market order.
    ///
    /// # Errors
    ///
    /// Returns error if the symbol or quantity is invalid.
    pub fn market(
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
        reduce_only: bool,
    ) -> Result<Self, OrderError> {
        Self::build(
            symbol,
            side,
            OrderType::Market,
            quantity,
            None,
            TimeInForce::ImmediateOrCancel,
            reduce_only,
        )
    }

    /// Create a limit order.
    ///
    /// # Errors
    ///
    /// Returns error if the symbol, quantity or price is invalid.
    pub fn limit(
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        time_in_force: TimeInForce,
        reduce_only: bool,
    ) -> Result<Self, OrderError> {
        if price <= Decimal::ZERO {
            return Err(OrderError::InvalidParameters {
                field: "limit_price".to_string(),
                message: format!("must be positive, got {price}"),
            });
        }
        Self::build(
            symbol,
            side,
            OrderType::Limit,
            quantity,
            Some(price),
            time_in_force,
            reduce_only,
        )
    }

    fn build(
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        quantity: Decimal,
        limit_price: Option<Decimal>,
        time_in_force: TimeInForce,
        reduce_only: bool,
    ) -> Result<Self, OrderError> {
        symbol
            .validate()
            .map_err(|e| OrderError::InvalidParameters {
                field: "symbol".to_string(),
                message: e.to_string(),
            })?;
        if quantity <= Decimal::ZERO {
            return Err(OrderError::InvalidParameters {
                field: "quantity".to_string(),
                message: format!("must be positive, got {quantity}"),
            });
        }

        let now = Utc::now();
        Ok(Self {
            client_order_id: ClientOrderId::generate(),
            exchange_order_id: None,
            symbol,
            side,
            order_type,
            quantity,
            limit_price,
            time_in_force,
            reduce_only,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            expected_price: None,
            slippage: None,
            latency_ms: None,
            reject_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Record the reference price used for slippage.
    #[must_use]
    pub const fn with_expected_price(mut self, price: Decimal) -> Self {
        self.expected_price = Some(price);
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Client order id (sent to the exchange as the link id).
    pub const fn client_order_id(&self) -> &ClientOrderId {
        &self.client_order_id
    }

    /// Exchange order id once acknowledged.
    pub const fn exchange_order_id(&self) -> Option<&ExchangeOrderId> {
        self.exchange_order_id.as_ref()
    }

    /// Instrument.
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Order side.
    pub const fn side(&self) -> Side {
        self.side
    }

    /// Order type.
    pub const fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Requested quantity.
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Limit price for limit orders.
    pub const fn limit_price(&self) -> Option<Decimal> {
        self.limit_price
    }

    /// Time in force.
    pub const fn time_in_force(&self) -> TimeInForce {
        self.time_in_force
    }

    /// Reduce-only flag.
    pub const fn reduce_only(&self) -> bool {
        self.reduce_only
    }

    /// Current status.
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Quantity filled so far.
    pub const fn filled_quantity(&self) -> Decimal {
        self.filled_quantity
    }

    /// Average fill price.
    pub const fn avg_fill_price(&self) -> Option<Decimal> {
        self.avg_fill_price
    }

    /// Reference price captured before submission.
    pub const fn expected_price(&self) -> Option<Decimal> {
        self.expected_price
    }

    /// Realized slippage once filled.
    pub const fn slippage(&self) -> Option<Decimal> {
        self.slippage
    }

    /// Submission-to-acknowledgement latency.
    pub const fn latency_ms(&self) -> Option<u64> {
        self.latency_ms
    }

    /// Exchange rejection message.
    pub fn reject_reason(&self) -> Option<&str> {
        self.reject_reason.as_deref()
    }

    /// Creation time.
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last update time.
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the order reached a terminal status.
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Record the exchange acknowledgement.
    pub fn acknowledge(&mut self, exchange_order_id: ExchangeOrderId, latency_ms: u64) {
        self.exchange_order_id = Some(exchange_order_id);
        self.latency_ms = Some(latency_ms);
        self.updated_at = Utc::now();
    }

    /// Apply a status report from the exchange.
    ///
    /// Returns `true` if the status changed. Reports repeating the current
    /// non-terminal status only refresh fill quantities.
    ///
    /// # Errors
    ///
    /// Returns error if the reported status is not reachable from the current one.
    pub fn apply_update(
        &mut self,
        status: OrderStatus,
        filled_quantity: Decimal,
        avg_fill_price: Option<Decimal>,
    ) -> Result<bool, OrderError> {
        let changed = status != self.status;
        if changed || status == OrderStatus::PartiallyFilled {
            OrderStateMachine::validate_transition(self.status, status)?;
        } else if self.status.is_terminal() {
            return Ok(false);
        }

        self.status = status;
        self.filled_quantity = filled_quantity;
        if let Some(price) = avg_fill_price.filter(|p| *p > Decimal::ZERO) {
            self.avg_fill_price = Some(price);
        }
        if status == OrderStatus::Filled {
            self.slippage = match (self.expected_price, self.avg_fill_price) {
                (Some(expected), Some(fill)) => slippage(self.side, expected, fill),
                _ => None,
            };
        }
        self.updated_at = Utc::now();
        Ok(changed)
    }

    /// Mark the order rejected.
    ///
    /// # Errors
    ///
    /// Returns error if the order already left `Pending`.
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        OrderStateMachine::validate_transition(self.status, OrderStatus::Rejected)?;
        self.status = OrderStatus::Rejected;
        self.reject_reason = Some(reason.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the order cancelled.
    ///
    /// # Errors
    ///
    /// Returns error if the order is already terminal.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        OrderStateMachine::validate_transition(self.status, OrderStatus::Cancelled)?;
        self.status = OrderStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }
}
