//! Trailing Stop Controller
//!
//! Ratchets trailing stops on every tick and closes positions whose stop,
//! take-profit or stop-loss level was reached. Work on one (symbol, side)
//! pair is serialized through `PairLocks`; different pairs run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use rust_decimal::Decimal;
use thiserror::Error;

use super::{ExecutionError, OrderExecutionEngine, PairLocks};
use crate::application::ports::{EventPublisherPort, StateStoreError, StateStorePort, TradeEvent};
use crate::domain::order_execution::OrderStatus;
use crate::domain::recovery::{ActiveStrategy, ExchangePosition, StrategyKind, StrategyParams};
use crate::domain::shared::{DomainError, PairKey, Side, Symbol};
use crate::domain::stop_enforcement::{
    StopUpdate, TrailingStop, is_stop_loss_hit, is_take_profit_hit,
};
use crate::observability;

/// Stop controller errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StopError {
    /// A close was triggered but no active strategy records the position.
    #[error("No active trade for {pair}; stop left armed")]
    TradeIdNotFound {
        /// Pair whose close could not be matched.
        pair: PairKey,
    },

    /// The closing order failed; the trigger stays armed.
    #[error("Close order for {pair} failed: {source}")]
    CloseFailed {
        /// Pair being closed.
        pair: PairKey,
        /// Execution failure.
        #[source]
        source: ExecutionError,
    },

    /// The closing order was accepted but has not filled; the trigger stays
    /// armed and the next tick retries.
    #[error("Close order for {pair} not filled ({status}); stop left armed")]
    CloseUnconfirmed {
        /// Pair being closed.
        pair: PairKey,
        /// Status the close order was left in.
        status: OrderStatus,
    },

    /// Invalid stop parameters.
    #[error("Invalid stop: {0}")]
    InvalidStop(#[from] DomainError),

    /// State store failure.
    #[error(transparent)]
    Store(#[from] StateStoreError),
}

/// Outcome of one evaluation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Pairs evaluated.
    pub evaluated: usize,
    /// Pairs whose trailing stop moved.
    pub raised: Vec<PairKey>,
    /// Pairs whose trigger fired.
    pub triggered: Vec<PairKey>,
    /// Pairs closed successfully.
    pub closed: Vec<PairKey>,
    /// Pairs that failed, with the reason. These stay armed.
    pub failures: Vec<(PairKey, String)>,
}

#[derive(Debug, Default)]
struct PairOutcome {
    raised: bool,
    triggered: bool,
    closed: bool,
    failure: Option<String>,
}

/// Enforces trailing stops and fixed exit levels.
pub struct TrailingStopController {
    store: Arc<dyn StateStorePort>,
    engine: Arc<OrderExecutionEngine>,
    events: Arc<dyn EventPublisherPort>,
    locks: Arc<PairLocks>,
}

impl std::fmt::Debug for TrailingStopController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrailingStopController").finish_non_exhaustive()
    }
}

impl TrailingStopController {
    /// Create a controller.
    #[must_use]
    pub fn new(
        store: Arc<dyn StateStorePort>,
        engine: Arc<OrderExecutionEngine>,
        events: Arc<dyn EventPublisherPort>,
        locks: Arc<PairLocks>,
    ) -> Self {
        Self {
            store,
            engine,
            events,
            locks,
        }
    }

    /// Arm a trailing stop for a freshly opened position and persist it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStop` for a non-positive price or a distance outside
    /// `(0, 1)`, or a store error.
    pub async fn arm(
        &self,
        symbol: Symbol,
        side: Side,
        entry_price: Decimal,
        trail_distance: Decimal,
    ) -> Result<TrailingStop, StopError> {
        let key = PairKey::new(symbol.clone(), side);
        let _guard = self.locks.lock(&key).await;
        self.arm_locked(symbol, side, entry_price, trail_distance).await
    }

    /// Same as [`arm`](Self::arm) for a caller already holding the pair lock.
    pub(crate) async fn arm_locked(
        &self,
        symbol: Symbol,
        side: Side,
        entry_price: Decimal,
        trail_distance: Decimal,
    ) -> Result<TrailingStop, StopError> {
        let stop = TrailingStop::new(symbol, side, entry_price, trail_distance)?;
        self.store.save_trailing_stop(&stop).await?;
        tracing::info!(
            symbol = %stop.symbol,
            side = %stop.side,
            stop_price = %stop.current_stop_price,
            trail_distance = %stop.trail_distance,
            "Trailing stop armed"
        );
        Ok(stop)
    }

    /// Run one tick against the given positions, using each position's mark
    /// price. Stops and strategies without a position are skipped; the
    /// reconciler deactivates them.
    ///
    /// # Errors
    ///
    /// Returns a store error if stops or strategies cannot be loaded.
    /// Per-pair failures are reported in the `TickReport`.
    pub async fn evaluate(&self, positions: &[ExchangePosition]) -> Result<TickReport, StopError> {
        let stops = self.store.get_trailing_stops().await?;
        let strategies = self.store.get_active_strategies().await?;

        let positions: HashMap<PairKey, &ExchangePosition> =
            positions.iter().map(|p| (p.key(), p)).collect();
        let strategies: HashMap<PairKey, ActiveStrategy> =
            strategies.into_iter().map(|s| (s.key(), s)).collect();

        let mut pairs: Vec<PairKey> = stops.iter().map(TrailingStop::key).collect();
        pairs.extend(
            strategies
                .values()
                .filter(|s| s.kind() != StrategyKind::TrailingStop)
                .map(ActiveStrategy::key),
        );
        pairs.sort();
        pairs.dedup();

        let work = pairs.into_iter().filter_map(|key| {
            let position = positions.get(&key)?;
            let strategy = strategies.get(&key).cloned();
            let price = position.mark_price;
            let size = position.size;
            Some(async move {
                let outcome = self.evaluate_pair(&key, strategy, price, size).await;
                (key, outcome)
            })
        });
        let outcomes = join_all(work).await;

        let mut report = TickReport {
            evaluated: outcomes.len(),
            ..TickReport::default()
        };
        for (key, outcome) in outcomes {
            if outcome.raised {
                report.raised.push(key.clone());
            }
            if outcome.triggered {
                report.triggered.push(key.clone());
            }
            if outcome.closed {
                report.closed.push(key.clone());
            }
            if let Some(reason) = outcome.failure {
                report.failures.push((key, reason));
            }
        }
        Ok(report)
    }

    async fn evaluate_pair(
        &self,
        key: &PairKey,
        strategy: Option<ActiveStrategy>,
        price: Decimal,
        position_size: Decimal,
    ) -> PairOutcome {
        let _guard = self.locks.lock(key).await;
        let mut outcome = PairOutcome::default();

        let result = self
            .step(key, strategy, price, position_size, &mut outcome)
            .await;
        if let Err(e) = result {
            match &e {
                StopError::TradeIdNotFound { .. } => {
                    tracing::error!(pair = %key, price = %price, "Close triggered without a known trade; stop left armed");
                }
                _ => {
                    tracing::error!(pair = %key, price = %price, error = %e, "Stop evaluation failed");
                }
            }
            outcome.failure = Some(e.to_string());
        }
        outcome
    }

    async fn step(
        &self,
        key: &PairKey,
        strategy: Option<ActiveStrategy>,
        price: Decimal,
        position_size: Decimal,
        outcome: &mut PairOutcome,
    ) -> Result<(), StopError> {
        // Re-read under the pair lock so a concurrent arm() is not overwritten.
        let stop = self
            .store
            .get_trailing_stops()
            .await?
            .into_iter()
            .find(|s| &s.key() == key);

        if let Some(mut stop) = stop {
            let before = stop.clone();
            match stop.on_price(price) {
                StopUpdate::Hold => {}
                StopUpdate::Moved {
                    previous_stop,
                    new_stop,
                } => {
                    self.store.save_trailing_stop(&stop).await?;
                    if new_stop != previous_stop {
                        outcome.raised = true;
                        tracing::info!(
                            pair = %key,
                            previous_stop = %previous_stop,
                            new_stop = %new_stop,
                            best_price = %stop.best_price,
                            "Trailing stop raised"
                        );
                    }
                }
                StopUpdate::Triggered { stop_price, .. } => {
                    outcome.triggered = true;
                    if stop.best_price != before.best_price {
                        self.store.save_trailing_stop(&stop).await?;
                    }
                    tracing::warn!(pair = %key, stop_price = %stop_price, price = %price, "Trailing stop triggered");
                    self.close(key, strategy.as_ref(), StrategyKind::TrailingStop, price, position_size)
                        .await?;
                    outcome.closed = true;
                }
            }
            return Ok(());
        }

        let Some(strategy) = strategy else {
            return Ok(());
        };
        let hit = match strategy.params {
            StrategyParams::TakeProfit(p) => is_take_profit_hit(key.side, p.target_price, price),
            StrategyParams::StopLoss(p) => is_stop_loss_hit(key.side, p.stop_price, price),
            StrategyParams::TrailingStop(_) => false,
        };
        if hit {
            outcome.triggered = true;
            tracing::warn!(pair = %key, kind = %strategy.kind(), price = %price, "Exit level reached");
            self.close(key, Some(&strategy), strategy.kind(), price, position_size)
                .await?;
            outcome.closed = true;
        }
        Ok(())
    }

    /// Close a position with a reduce-only market order and retire its state
    /// once the order reports filled.
    async fn close(
        &self,
        key: &PairKey,
        strategy: Option<&ActiveStrategy>,
        trigger: StrategyKind,
        price: Decimal,
        position_size: Decimal,
    ) -> Result<(), StopError> {
        let Some(strategy) = strategy else {
            observability::record_stop_trigger(trigger.as_str(), "trade_not_found");
            return Err(StopError::TradeIdNotFound { pair: key.clone() });
        };
        let quantity = strategy.position_size.min(position_size);

        let order = match self
            .engine
            .place_market_order(key.symbol.clone(), key.side.opposite(), quantity, true)
            .await
        {
            Ok(order) => order,
            Err(source) => {
                observability::record_stop_trigger(trigger.as_str(), "close_failed");
                return Err(StopError::CloseFailed {
                    pair: key.clone(),
                    source,
                });
            }
        };
        if order.status() != OrderStatus::Filled {
            observability::record_stop_trigger(trigger.as_str(), "close_unconfirmed");
            return Err(StopError::CloseUnconfirmed {
                pair: key.clone(),
                status: order.status(),
            });
        }

        self.store.remove_trailing_stop(&key.symbol, key.side).await?;
        self.store.deactivate_strategy(&key.symbol, key.side).await?;
        observability::record_stop_trigger(trigger.as_str(), "closed");
        tracing::info!(pair = %key, trigger = %trigger, qty = %quantity, "Position closed");

        let event = TradeEvent::PositionClosed {
            symbol: key.symbol.clone(),
            side: key.side,
            trigger,
            price,
        };
        if let Err(e) = self.events.publish(event).await {
            tracing::warn!(error = %e, "Failed to publish close event");
        }
        Ok(())
    }
}
