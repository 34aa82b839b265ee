//! Order Execution Engine
//!
//! Places market and limit orders through the exchange port, tracks them
//! until they reach a terminal status and keeps a bounded history from
//! which execution statistics are computed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use thiserror::Error;
use tokio::time::Instant;

use super::OrderRateLimiter;
use crate::application::ports::{
    Category, EventPublisherPort, ExchangeError, ExchangeOrderState, ExchangePort,
    PlaceOrderRequest, TradeEvent,
};
use crate::domain::order_execution::{
    ExecutionStats, Order, OrderError, OrderStatus, OrderType, TimeInForce,
};
use crate::domain::shared::{ExchangeOrderId, Side, Symbol};
use crate::observability;

// ============================================================================
// Errors
// ============================================================================

/// Errors returned to callers of the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The exchange did not answer in time and the order state is unknown.
    #[error("Exchange call timed out: {operation}")]
    AdapterTimeout {
        /// Operation that timed out.
        operation: String,
    },

    /// The exchange rejected the order.
    #[error("Order rejected: {reason}")]
    OrderRejected {
        /// Exchange reason.
        reason: String,
    },

    /// No reference price could be fetched; nothing was submitted.
    #[error("No reference price available for {symbol}")]
    PriceUnavailable {
        /// Instrument.
        symbol: Symbol,
    },

    /// Rate limited by the exchange.
    #[error("Rate limited by exchange")]
    RateLimited,

    /// The order is not known to the engine.
    #[error("Order not found: {order_id}")]
    OrderNotFound {
        /// Exchange order id.
        order_id: String,
    },

    /// The order parameters are invalid.
    #[error("Invalid order: {message}")]
    InvalidOrder {
        /// Error details.
        message: String,
    },

    /// Any other exchange failure.
    #[error(transparent)]
    Exchange(ExchangeError),
}

impl From<ExchangeError> for ExecutionError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::Timeout { operation } => Self::AdapterTimeout { operation },
            ExchangeError::RateLimited => Self::RateLimited,
            ExchangeError::Rejected { code, message } => Self::OrderRejected {
                reason: format!("{code}: {message}"),
            },
            other => Self::Exchange(other),
        }
    }
}

impl From<OrderError> for ExecutionError {
    fn from(err: OrderError) -> Self {
        Self::InvalidOrder {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Execution engine settings.
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Instrument category orders are placed in.
    pub category: Category,
    /// Minimum spacing between order submissions.
    pub min_order_interval: Duration,
    /// Slippage above which a warning is logged.
    pub max_acceptable_slippage: Decimal,
    /// Terminal orders kept in history.
    pub history_limit: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            category: Category::Linear,
            min_order_interval: Duration::from_millis(100),
            max_acceptable_slippage: Decimal::new(5, 3),
            history_limit: 1000,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Default)]
struct OrderBook {
    open: HashMap<ExchangeOrderId, Order>,
    history: VecDeque<Order>,
}

/// Places orders and owns them while they are in flight.
pub struct OrderExecutionEngine {
    exchange: Arc<dyn ExchangePort>,
    events: Arc<dyn EventPublisherPort>,
    settings: ExecutionSettings,
    rate_limiter: OrderRateLimiter,
    book: Mutex<OrderBook>,
}

impl std::fmt::Debug for OrderExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderExecutionEngine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl OrderExecutionEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(
        exchange: Arc<dyn ExchangePort>,
        events: Arc<dyn EventPublisherPort>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            rate_limiter: OrderRateLimiter::new(settings.min_order_interval),
            exchange,
            events,
            settings,
            book: Mutex::new(OrderBook::default()),
        }
    }

    /// Engine settings.
    #[must_use]
    pub const fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Place a market order.
    ///
    /// Fetches a reference price first; slippage against it is computed when
    /// the fill is observed. A market order the exchange fills immediately is
    /// returned in the `Filled` state.
    ///
    /// # Errors
    ///
    /// `PriceUnavailable` if no reference price exists, `OrderRejected` if
    /// the exchange refuses the order, `AdapterTimeout` if the outcome could
    /// not be confirmed.
    pub async fn place_market_order(
        &self,
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
        reduce_only: bool,
    ) -> Result<Order, ExecutionError> {
        let order = Order::market(symbol, side, quantity, reduce_only)?;
        let expected_price = self.reference_price(order.symbol(), side).await?;
        self.submit(order.with_expected_price(expected_price)).await
    }

    /// Place a limit order. It stays open until the monitor observes a
    /// terminal status.
    ///
    /// # Errors
    ///
    /// `OrderRejected` if the exchange refuses the order, `AdapterTimeout` if
    /// the outcome could not be confirmed.
    pub async fn place_limit_order(
        &self,
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        reduce_only: bool,
        time_in_force: TimeInForce,
    ) -> Result<Order, ExecutionError> {
        let order = Order::limit(symbol, side, quantity, price, time_in_force, reduce_only)?;
        self.submit(order).await
    }

    /// Cancel one order.
    ///
    /// Returns `true` if the order was cancelled by this call and `false` if
    /// it had already closed.
    ///
    /// # Errors
    ///
    /// `AdapterTimeout` if the exchange did not answer; the order stays
    /// tracked and the monitor will observe its eventual state.
    pub async fn cancel_order(
        &self,
        order_id: &ExchangeOrderId,
        symbol: &Symbol,
    ) -> Result<bool, ExecutionError> {
        let tracked = {
            let book = self.book.lock();
            if book.history.iter().any(|o| o.exchange_order_id() == Some(order_id)) {
                return Ok(false);
            }
            book.open.contains_key(order_id)
        };

        match self
            .exchange
            .cancel_order(self.settings.category, symbol, order_id)
            .await
        {
            Ok(()) => {
                if !tracked {
                    tracing::info!(order_id = %order_id, symbol = %symbol, "Order cancelled");
                    return Ok(true);
                }
                // The ack does not say what filled before the cancel landed.
                let state = match self
                    .exchange
                    .get_open_orders(self.settings.category, symbol, Some(order_id))
                    .await
                {
                    Ok(states) => states.into_iter().find(|s| &s.order_id == order_id),
                    Err(e) => {
                        tracing::warn!(order_id = %order_id, error = %e, "Post-cancel status query failed");
                        None
                    }
                };
                if let Some(state) = state {
                    self.apply_to_tracked(&state).await;
                    if state.status.is_terminal() {
                        tracing::info!(
                            order_id = %order_id,
                            symbol = %symbol,
                            status = %state.status,
                            filled_qty = %state.filled_quantity,
                            "Order closed after cancel"
                        );
                        return Ok(state.status == OrderStatus::Cancelled);
                    }
                }
                self.cancel_tracked(order_id).await;
                tracing::info!(order_id = %order_id, symbol = %symbol, "Order cancelled");
                Ok(true)
            }
            Err(ExchangeError::Rejected { code, message }) => {
                if !tracked {
                    tracing::debug!(order_id = %order_id, code, "Untracked order already closed");
                    return Ok(false);
                }
                // Too late to cancel: learn the final state instead.
                let states = self
                    .exchange
                    .get_open_orders(self.settings.category, symbol, Some(order_id))
                    .await?;
                match states.into_iter().find(|s| &s.order_id == order_id) {
                    Some(state) if state.status.is_terminal() => {
                        self.apply_to_tracked(&state).await;
                        Ok(false)
                    }
                    _ => Err(ExecutionError::OrderRejected {
                        reason: format!("{code}: {message}"),
                    }),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cancel all open orders, optionally for one symbol. Returns how many
    /// the exchange cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange call fails.
    pub async fn cancel_all_orders(&self, symbol: Option<&Symbol>) -> Result<usize, ExecutionError> {
        let cancelled = self
            .exchange
            .cancel_all_orders(self.settings.category, symbol)
            .await?;

        let removed: Vec<Order> = {
            let mut book = self.book.lock();
            cancelled
                .iter()
                .filter_map(|id| book.open.remove(id))
                .collect()
        };
        for order in removed {
            self.retire_cancelled(order).await;
        }

        tracing::info!(
            symbol = symbol.map_or("*", Symbol::as_str),
            count = cancelled.len(),
            "Cancelled all orders"
        );
        Ok(cancelled.len())
    }

    /// Orders currently in flight.
    #[must_use]
    pub fn get_open_orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.book.lock().open.values().cloned().collect();
        orders.sort_by_key(Order::created_at);
        orders
    }

    /// Look up an order, open or historical.
    #[must_use]
    pub fn get_order(&self, order_id: &ExchangeOrderId) -> Option<Order> {
        let book = self.book.lock();
        book.open.get(order_id).cloned().or_else(|| {
            book.history
                .iter()
                .rev()
                .find(|o| o.exchange_order_id() == Some(order_id))
                .cloned()
        })
    }

    /// Execution statistics computed from history.
    #[must_use]
    pub fn get_execution_stats(&self) -> ExecutionStats {
        let book = self.book.lock();
        ExecutionStats::from_history(book.history.iter(), book.open.len())
    }

    /// Poll the exchange once for every open order and retire the ones that
    /// reached a terminal status. Returns how many were retired.
    ///
    /// # Errors
    ///
    /// Returns the first exchange error; orders not yet polled are retried
    /// on the next call.
    pub async fn poll_open_orders(&self) -> Result<usize, ExchangeError> {
        let tracked: Vec<(ExchangeOrderId, Symbol)> = self
            .book
            .lock()
            .open
            .iter()
            .map(|(id, order)| (id.clone(), order.symbol().clone()))
            .collect();

        let mut retired = 0;
        for (order_id, symbol) in tracked {
            let states = self
                .exchange
                .get_open_orders(self.settings.category, &symbol, Some(&order_id))
                .await?;
            match states.into_iter().find(|s| s.order_id == order_id) {
                Some(state) => {
                    if self.apply_to_tracked(&state).await {
                        retired += 1;
                    }
                }
                None => tracing::debug!(order_id = %order_id, "Order not reported by exchange"),
            }
        }

        observability::update_open_orders(self.book.lock().open.len());
        Ok(retired)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn reference_price(&self, symbol: &Symbol, side: Side) -> Result<Decimal, ExecutionError> {
        let unavailable = || ExecutionError::PriceUnavailable {
            symbol: symbol.clone(),
        };
        let ticker = self
            .exchange
            .get_ticker(self.settings.category, symbol)
            .await
            .map_err(|e| {
                tracing::warn!(symbol = %symbol, error = %e, "Reference price fetch failed");
                unavailable()
            })?;
        ticker.reference_price(side).ok_or_else(unavailable)
    }

    async fn submit(&self, mut order: Order) -> Result<Order, ExecutionError> {
        let request = PlaceOrderRequest {
            category: self.settings.category,
            symbol: order.symbol().clone(),
            side: order.side(),
            order_type: order.order_type(),
            quantity: order.quantity(),
            price: order.limit_price(),
            trigger_price: None,
            time_in_force: Some(order.time_in_force()),
            reduce_only: order.reduce_only(),
            client_order_id: order.client_order_id().clone(),
        };
        let order_type = if order.order_type() == OrderType::Market {
            "market"
        } else {
            "limit"
        };

        self.rate_limiter.acquire().await;
        let started = Instant::now();
        let result = self.exchange.place_order(request).await;
        let elapsed = started.elapsed();
        let latency_ms = elapsed.as_millis() as u64;

        let mut known_state = None;
        match result {
            Ok(ack) => {
                observability::record_order_submission(
                    order_type,
                    "acknowledged",
                    elapsed.as_secs_f64(),
                );
                order.acknowledge(ack.order_id, latency_ms);
            }
            Err(ExchangeError::Rejected { code, message }) => {
                observability::record_order_submission(order_type, "rejected", elapsed.as_secs_f64());
                let reason = format!("{code}: {message}");
                if let Err(e) = order.reject(reason.clone()) {
                    tracing::warn!(error = %e, "Could not mark order rejected");
                }
                self.complete(order).await;
                return Err(ExecutionError::OrderRejected { reason });
            }
            Err(ExchangeError::Timeout { operation }) => {
                observability::record_order_submission(order_type, "timeout", elapsed.as_secs_f64());
                let state = self.find_by_client_id(&order).await;
                let Some(state) = state else {
                    tracing::error!(
                        client_order_id = %order.client_order_id(),
                        symbol = %order.symbol(),
                        "Order placement timed out and the exchange does not know the order"
                    );
                    return Err(ExecutionError::AdapterTimeout { operation });
                };
                tracing::warn!(
                    client_order_id = %order.client_order_id(),
                    order_id = %state.order_id,
                    "Order placement timed out but the exchange accepted it"
                );
                order.acknowledge(state.order_id.clone(), latency_ms);
                known_state = Some(state);
            }
            Err(e) => {
                observability::record_order_submission(order_type, "error", elapsed.as_secs_f64());
                return Err(e.into());
            }
        }

        tracing::info!(
            client_order_id = %order.client_order_id(),
            order_id = ?order.exchange_order_id(),
            symbol = %order.symbol(),
            side = %order.side(),
            qty = %order.quantity(),
            latency_ms,
            "Order acknowledged"
        );

        if known_state.is_none() && order.order_type() == OrderType::Market {
            known_state = self.query_state(&order).await;
        }
        if let Some(state) = known_state {
            apply_state(&mut order, &state);
        }

        if order.is_terminal() {
            let snapshot = order.clone();
            self.complete(order).await;
            if snapshot.status() == OrderStatus::Rejected {
                return Err(ExecutionError::OrderRejected {
                    reason: snapshot
                        .reject_reason()
                        .unwrap_or("rejected by exchange")
                        .to_string(),
                });
            }
            return Ok(snapshot);
        }

        if let Some(id) = order.exchange_order_id().cloned() {
            self.book.lock().open.insert(id, order.clone());
        }
        Ok(order)
    }

    async fn find_by_client_id(&self, order: &Order) -> Option<ExchangeOrderState> {
        match self
            .exchange
            .get_order_by_client_id(
                self.settings.category,
                order.symbol(),
                order.client_order_id(),
            )
            .await
        {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(
                    client_order_id = %order.client_order_id(),
                    error = %e,
                    "Order lookup by client id failed"
                );
                None
            }
        }
    }

    async fn query_state(&self, order: &Order) -> Option<ExchangeOrderState> {
        let order_id = order.exchange_order_id()?;
        match self
            .exchange
            .get_open_orders(self.settings.category, order.symbol(), Some(order_id))
            .await
        {
            Ok(states) => states.into_iter().find(|s| &s.order_id == order_id),
            Err(e) => {
                tracing::warn!(order_id = %order_id, error = %e, "Order status query failed");
                None
            }
        }
    }

    async fn cancel_tracked(&self, order_id: &ExchangeOrderId) {
        let order = self.book.lock().open.remove(order_id);
        if let Some(order) = order {
            self.retire_cancelled(order).await;
        }
    }

    /// Mark a removed open order cancelled and retire it. An order that
    /// refuses the transition goes back to the open set for the monitor.
    async fn retire_cancelled(&self, mut order: Order) {
        match order.cancel() {
            Ok(()) => self.complete(order).await,
            Err(e) => {
                tracing::warn!(
                    order_id = ?order.exchange_order_id(),
                    status = %order.status(),
                    error = %e,
                    "Cancelled order could not be closed locally; left for the monitor"
                );
                if let Some(id) = order.exchange_order_id().cloned() {
                    self.book.lock().open.insert(id, order);
                }
            }
        }
    }

    /// Apply an exchange report to a tracked order. Returns whether the
    /// order was retired.
    async fn apply_to_tracked(&self, state: &ExchangeOrderState) -> bool {
        let finished = {
            let mut book = self.book.lock();
            let Some(order) = book.open.get_mut(&state.order_id) else {
                return false;
            };
            apply_state(order, state);
            if order.is_terminal() {
                book.open.remove(&state.order_id)
            } else {
                None
            }
        };
        match finished {
            Some(order) => {
                self.complete(order).await;
                true
            }
            None => false,
        }
    }

    /// Move a terminal order to history and announce it.
    async fn complete(&self, order: Order) {
        let event = match order.status() {
            OrderStatus::Filled => {
                self.check_slippage(&order);
                observability::record_order_fill(
                    order.symbol().as_str(),
                    order.slippage().and_then(|s| s.to_f64()),
                );
                Some(TradeEvent::OrderFilled {
                    client_order_id: order.client_order_id().clone(),
                    symbol: order.symbol().clone(),
                    side: order.side(),
                    quantity: order.filled_quantity(),
                    price: order.avg_fill_price(),
                    slippage: order.slippage(),
                })
            }
            OrderStatus::Rejected => {
                let reason = order.reject_reason().unwrap_or("unknown").to_string();
                tracing::warn!(
                    client_order_id = %order.client_order_id(),
                    symbol = %order.symbol(),
                    reason = %reason,
                    "Order rejected"
                );
                observability::record_order_rejection("exchange");
                Some(TradeEvent::OrderRejected {
                    client_order_id: order.client_order_id().clone(),
                    symbol: order.symbol().clone(),
                    side: order.side(),
                    reason,
                })
            }
            OrderStatus::Cancelled => Some(TradeEvent::OrderCancelled {
                client_order_id: order.client_order_id().clone(),
                symbol: order.symbol().clone(),
            }),
            OrderStatus::Pending | OrderStatus::PartiallyFilled => None,
        };

        {
            let mut book = self.book.lock();
            book.history.push_back(order);
            while book.history.len() > self.settings.history_limit {
                book.history.pop_front();
            }
        }

        if let Some(event) = event
            && let Err(e) = self.events.publish(event).await
        {
            tracing::warn!(error = %e, "Failed to publish order event");
        }
    }

    fn check_slippage(&self, order: &Order) {
        let Some(slippage) = order.slippage() else {
            return;
        };
        if slippage.abs() > self.settings.max_acceptable_slippage {
            tracing::warn!(
                client_order_id = %order.client_order_id(),
                symbol = %order.symbol(),
                slippage = %slippage,
                max = %self.settings.max_acceptable_slippage,
                "Slippage above acceptable threshold"
            );
        } else {
            tracing::info!(
                client_order_id = %order.client_order_id(),
                symbol = %order.symbol(),
                price = ?order.avg_fill_price(),
                slippage = %slippage,
                "Order filled"
            );
        }
    }
}

/// Apply an exchange report, keeping the rejection reason when there is one.
fn apply_state(order: &mut Order, state: &ExchangeOrderState) {
    let result = if state.status == OrderStatus::Rejected {
        order.reject(
            state
                .reason
                .clone()
                .unwrap_or_else(|| "rejected by exchange".to_string()),
        )
    } else {
        order
            .apply_update(state.status, state.filled_quantity, state.avg_fill_price)
            .map(|_| ())
    };
    if let Err(e) = result {
        tracing::warn!(
            client_order_id = %order.client_order_id(),
            reported = %state.status,
            error = %e,
            "Ignoring exchange status report"
        );
    }
}
