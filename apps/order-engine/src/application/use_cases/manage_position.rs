//! Enter / Exit Position Use Case
//!
//! Entry points for strategy decisions coming from the signal generator.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::application::ports::{ExchangeError, ExchangePort, StateStoreError, StateStorePort};
use crate::application::services::{
    ExecutionError, OrderExecutionEngine, PairLocks, PositionSource, StopError,
    TrailingStopController, fetch_positions,
};
use crate::domain::order_execution::{Order, OrderStatus};
use crate::domain::recovery::{ActiveStrategy, StrategyParams};
use crate::domain::shared::{DomainError, PairKey, Side, Symbol};
use crate::domain::stop_enforcement::TrailingStop;

/// Position use case errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    /// Order placement failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Stop could not be armed.
    #[error(transparent)]
    Stop(#[from] StopError),

    /// State store failure.
    #[error(transparent)]
    Store(#[from] StateStoreError),

    /// Positions could not be fetched.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// Invalid request.
    #[error(transparent)]
    Invalid(#[from] DomainError),

    /// The entry order did not fill and was cancelled.
    #[error("Entry order for {symbol} did not fill (status {status})")]
    NotFilled {
        /// Instrument.
        symbol: Symbol,
        /// Order status after placement.
        status: OrderStatus,
    },

    /// Nothing to exit.
    #[error("No open position for {symbol}")]
    NoOpenPosition {
        /// Instrument.
        symbol: Symbol,
    },
}

/// A position opened by `enter_position`.
#[derive(Debug, Clone, Serialize)]
pub struct PositionEntry {
    /// Entry order.
    pub order: Order,
    /// Strategy recorded for the position.
    pub strategy: ActiveStrategy,
    /// Trailing stop, for trailing strategies.
    pub trailing_stop: Option<TrailingStop>,
}

/// One leg closed by `exit_position`.
#[derive(Debug, Clone, Serialize)]
pub struct PositionExit {
    /// Pair reduced.
    pub pair: PairKey,
    /// Closing order.
    pub order: Order,
    /// Position fully closed by a filled order.
    pub fully_closed: bool,
}

/// Opens and closes positions on behalf of the strategy layer.
pub struct PositionService {
    engine: Arc<OrderExecutionEngine>,
    controller: Arc<TrailingStopController>,
    exchange: Arc<dyn ExchangePort>,
    store: Arc<dyn StateStorePort>,
    locks: Arc<PairLocks>,
    position_sources: Vec<PositionSource>,
    default_trail_distance: Decimal,
}

impl std::fmt::Debug for PositionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionService")
            .field("default_trail_distance", &self.default_trail_distance)
            .finish_non_exhaustive()
    }
}

impl PositionService {
    /// Create a new `PositionService`.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        engine: Arc<OrderExecutionEngine>,
        controller: Arc<TrailingStopController>,
        exchange: Arc<dyn ExchangePort>,
        store: Arc<dyn StateStorePort>,
        locks: Arc<PairLocks>,
        position_sources: Vec<PositionSource>,
        default_trail_distance: Decimal,
    ) -> Self {
        Self {
            engine,
            controller,
            exchange,
            store,
            locks,
            position_sources,
            default_trail_distance,
        }
    }

    /// Open a position with a market order and record its exit strategy.
    /// Without `params` a trailing stop at the default distance is used.
    ///
    /// The pair stays locked from placement until the stop is armed, and
    /// reconciliation waits for the entry to finish. An order that does not
    /// fill on placement is cancelled; whatever filled before the cancel is
    /// still recorded and protected.
    ///
    /// # Errors
    ///
    /// Execution errors from the entry order or its cancel, `NotFilled` if
    /// nothing filled, or store and stop errors.
    pub async fn enter_position(
        &self,
        symbol: Symbol,
        side: Side,
        size: Decimal,
        params: Option<StrategyParams>,
    ) -> Result<PositionEntry, PositionError> {
        symbol.validate()?;
        let params = params.unwrap_or(StrategyParams::trailing(self.default_trail_distance));
        if let StrategyParams::TrailingStop(p) = params {
            // Fail before the order goes out.
            TrailingStop::new(symbol.clone(), side, Decimal::ONE, p.trail_distance)?;
        }

        let _entry = self.locks.lock_entry(&PairKey::new(symbol.clone(), side)).await;
        let mut order = self
            .engine
            .place_market_order(symbol.clone(), side, size, false)
            .await?;
        if order.status() != OrderStatus::Filled {
            order = self.cancel_unfilled_entry(order).await?;
        }
        let filled = order.filled_quantity() > Decimal::ZERO;
        let Some(entry_price) = order.avg_fill_price().filter(|_| filled) else {
            return Err(PositionError::NotFilled {
                symbol,
                status: order.status(),
            });
        };

        let strategy = ActiveStrategy::new(
            symbol.clone(),
            side,
            entry_price,
            order.filled_quantity(),
            params,
        );
        self.store.save_active_strategy(&strategy).await?;

        let trailing_stop = match params {
            StrategyParams::TrailingStop(p) => Some(
                self.controller
                    .arm_locked(symbol.clone(), side, entry_price, p.trail_distance)
                    .await?,
            ),
            StrategyParams::TakeProfit(_) | StrategyParams::StopLoss(_) => None,
        };

        tracing::info!(
            symbol = %symbol,
            side = %side,
            size = %strategy.position_size,
            entry_price = %entry_price,
            strategy = %strategy.kind(),
            "Position entered"
        );
        Ok(PositionEntry {
            order,
            strategy,
            trailing_stop,
        })
    }

    /// Cancel an entry order that did not fill on placement and return its
    /// final state.
    async fn cancel_unfilled_entry(&self, order: Order) -> Result<Order, PositionError> {
        let Some(order_id) = order.exchange_order_id().cloned() else {
            return Ok(order);
        };
        tracing::warn!(
            order_id = %order_id,
            symbol = %order.symbol(),
            status = %order.status(),
            filled_qty = %order.filled_quantity(),
            "Entry order not filled, cancelling"
        );
        self.engine
            .cancel_order(&order_id, order.symbol())
            .await
            .map_err(|e| {
                tracing::error!(
                    order_id = %order_id,
                    error = %e,
                    "Entry order cancel failed; order left with the monitor"
                );
                e
            })?;
        Ok(self.engine.get_order(&order_id).unwrap_or(order))
    }

    /// Reduce or close every open position on `symbol`. Without `size` the
    /// whole position is closed. Stored state follows the filled quantity; a
    /// closing order still resting leaves it untouched.
    ///
    /// # Errors
    ///
    /// `NoOpenPosition` if the exchange reports none, or the first execution
    /// or store error.
    pub async fn exit_position(
        &self,
        symbol: &Symbol,
        size: Option<Decimal>,
    ) -> Result<Vec<PositionExit>, PositionError> {
        let positions: Vec<_> = fetch_positions(self.exchange.as_ref(), &self.position_sources)
            .await?
            .into_iter()
            .filter(|p| &p.symbol == symbol)
            .collect();
        if positions.is_empty() {
            return Err(PositionError::NoOpenPosition {
                symbol: symbol.clone(),
            });
        }

        let mut exits = Vec::with_capacity(positions.len());
        for position in positions {
            let key = position.key();
            let _guard = self.locks.lock(&key).await;

            let quantity = size.map_or(position.size, |s| s.min(position.size));
            let order = self
                .engine
                .place_market_order(symbol.clone(), position.side.opposite(), quantity, true)
                .await?;
            let filled = order.filled_quantity();
            let fully_closed = order.status() == OrderStatus::Filled && filled >= position.size;

            if fully_closed {
                self.store.remove_trailing_stop(symbol, position.side).await?;
                self.store.deactivate_strategy(symbol, position.side).await?;
            } else if filled > Decimal::ZERO {
                let strategy = self
                    .store
                    .get_active_strategies()
                    .await?
                    .into_iter()
                    .find(|s| s.key() == key);
                if let Some(mut strategy) = strategy {
                    strategy.position_size = (strategy.position_size - filled).max(Decimal::ZERO);
                    self.store.save_active_strategy(&strategy).await?;
                }
            }

            if order.status() == OrderStatus::Filled {
                tracing::info!(pair = %key, qty = %quantity, fully_closed, "Position exited");
            } else {
                tracing::warn!(
                    pair = %key,
                    qty = %quantity,
                    filled_qty = %filled,
                    status = %order.status(),
                    "Exit order not filled; stored state follows the filled quantity"
                );
            }
            exits.push(PositionExit {
                pair: key,
                order,
                fully_closed,
            });
        }
        Ok(exits)
    }
}
