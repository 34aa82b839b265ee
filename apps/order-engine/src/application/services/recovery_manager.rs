//! Recovery & Reconciliation Manager
//!
//! Rebuilds durable strategy state against the exchange after a restart,
//! decides whether the trading bot should be relaunched, and then keeps
//! local state reconciled on a fixed interval.
//!
//! State machine: `Idle -> InitialRecovery -> Monitoring`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::{PairLocks, StopError, TrailingStopController};
use crate::application::ports::{
    BotControlPort, Category, CleanupReport, ControlError, EventPublisherPort, ExchangeError,
    ExchangePort, StateStoreError, StateStorePort, TradeEvent,
};
use crate::domain::recovery::{
    ActiveStrategy, ExchangePosition, RecoverySnapshot, RestartPolicy, StrategyParams,
};
use crate::domain::shared::PairKey;
use crate::domain::stop_enforcement::TrailingStop;
use crate::observability;

// ============================================================================
// Errors
// ============================================================================

/// Recovery errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryError {
    /// Exchange positions could not be fetched.
    #[error("Exchange unavailable during recovery: {0}")]
    Exchange(#[from] ExchangeError),

    /// State store failure.
    #[error(transparent)]
    StateStore(#[from] StateStoreError),

    /// Bot launch failed.
    #[error(transparent)]
    Launch(#[from] ControlError),

    /// Stop evaluation failed.
    #[error(transparent)]
    Stop(#[from] StopError),
}

// ============================================================================
// Settings and Reports
// ============================================================================

/// Lifecycle state of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryState {
    /// Not started yet.
    #[default]
    Idle,
    /// Initial recovery in progress.
    InitialRecovery,
    /// Steady-state reconciliation loop.
    Monitoring,
}

/// One `get_positions` query. Together the sources cover every category the
/// bot trades.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSource {
    /// Instrument category.
    pub category: Category,
    /// Settle coin filter.
    pub settle_coin: Option<String>,
}

impl Default for PositionSource {
    fn default() -> Self {
        Self {
            category: Category::Linear,
            settle_coin: Some("USDT".to_string()),
        }
    }
}

/// Positions across every source. Any failure fails the whole fetch so that
/// a partial view never drives cleanup.
pub(crate) async fn fetch_positions(
    exchange: &dyn ExchangePort,
    sources: &[PositionSource],
) -> Result<Vec<ExchangePosition>, ExchangeError> {
    let mut positions = Vec::new();
    for source in sources {
        let batch = exchange
            .get_positions(source.category, source.settle_coin.as_deref())
            .await?;
        positions.extend(batch);
    }
    positions.sort_by_key(ExchangePosition::key);
    positions.dedup_by_key(|p| p.key());
    Ok(positions)
}

/// Recovery manager settings.
#[derive(Debug, Clone)]
pub struct RecoverySettings {
    /// Position queries run on every fetch.
    pub position_sources: Vec<PositionSource>,
    /// Auto-restart policy.
    pub restart_policy: RestartPolicy,
    /// Delay between monitoring ticks.
    pub monitor_interval: Duration,
    /// Extra delay after a failed tick.
    pub error_backoff: Duration,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            position_sources: vec![PositionSource::default()],
            restart_policy: RestartPolicy::default(),
            monitor_interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(10),
        }
    }
}

/// Result of `perform_initial_recovery`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySummary {
    /// Active strategies backed by an open position.
    pub strategies_recovered: usize,
    /// Active trailing stops after re-arming.
    pub trailing_stops_recovered: usize,
    /// Trailing stops recreated from the mark price.
    pub trailing_stops_rearmed: usize,
    /// Open exchange positions.
    pub open_positions: usize,
    /// Rows deactivated by reconciliation.
    pub deactivated: usize,
    /// Whether a bot restart was scheduled.
    pub restart_scheduled: bool,
    /// When recovery finished.
    pub completed_at: DateTime<Utc>,
}

// ============================================================================
// Manager
// ============================================================================

/// Crash recovery and periodic reconciliation.
pub struct RecoveryManager {
    exchange: Arc<dyn ExchangePort>,
    store: Arc<dyn StateStorePort>,
    controller: Arc<TrailingStopController>,
    bot_control: Arc<dyn BotControlPort>,
    events: Arc<dyn EventPublisherPort>,
    locks: Arc<PairLocks>,
    settings: RecoverySettings,
    tasks: TaskTracker,
    state: RwLock<RecoveryState>,
    last_summary: RwLock<Option<RecoverySummary>>,
    // Serializes whole recovery passes.
    gate: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for RecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryManager")
            .field("state", &*self.state.read())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RecoveryManager {
    /// Create a manager. Restarts are spawned on `tasks`.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        exchange: Arc<dyn ExchangePort>,
        store: Arc<dyn StateStorePort>,
        controller: Arc<TrailingStopController>,
        bot_control: Arc<dyn BotControlPort>,
        events: Arc<dyn EventPublisherPort>,
        locks: Arc<PairLocks>,
        settings: RecoverySettings,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            exchange,
            store,
            controller,
            bot_control,
            events,
            locks,
            settings,
            tasks,
            state: RwLock::new(RecoveryState::Idle),
            last_summary: RwLock::new(None),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RecoveryState {
        *self.state.read()
    }

    /// Summary of the last completed initial recovery.
    #[must_use]
    pub fn last_summary(&self) -> Option<RecoverySummary> {
        self.last_summary.read().clone()
    }

    /// Reconcile durable state against the exchange and schedule a bot
    /// restart if the snapshot calls for one.
    ///
    /// Running it twice against unchanged exchange state leaves the store
    /// unchanged, places no orders and schedules at most one restart.
    ///
    /// # Errors
    ///
    /// Returns an error if positions cannot be fetched or the store fails.
    /// Nothing is deactivated when the position fetch fails.
    pub async fn perform_initial_recovery(&self) -> Result<RecoverySummary, RecoveryError> {
        let _gate = self.gate.lock().await;
        *self.state.write() = RecoveryState::InitialRecovery;
        tracing::info!("Initial recovery started");

        let result = self.recover().await;
        *self.state.write() = RecoveryState::Monitoring;

        match &result {
            Ok(summary) => {
                tracing::info!(
                    strategies = summary.strategies_recovered,
                    trailing_stops = summary.trailing_stops_recovered,
                    rearmed = summary.trailing_stops_rearmed,
                    open_positions = summary.open_positions,
                    deactivated = summary.deactivated,
                    restart_scheduled = summary.restart_scheduled,
                    "Initial recovery completed"
                );
                *self.last_summary.write() = Some(summary.clone());
                self.publish(TradeEvent::RecoveryCompleted {
                    strategies_recovered: summary.strategies_recovered,
                    trailing_stops_recovered: summary.trailing_stops_recovered,
                    open_positions: summary.open_positions,
                    restart_scheduled: summary.restart_scheduled,
                })
                .await;
            }
            Err(e) => tracing::error!(error = %e, "Initial recovery failed"),
        }
        result
    }

    async fn recover(&self) -> Result<RecoverySummary, RecoveryError> {
        let now = Utc::now();
        let snapshot = self
            .store
            .get_recovery_snapshot()
            .await?
            .unwrap_or_default();
        let should_restart = self.settings.restart_policy.should_restart(&snapshot, now);

        let (positions, report) = self.sync_positions().await?;

        let strategies = self.store.get_active_strategies().await?;
        let rearmed = self.rearm(&strategies, &positions).await?;
        let trailing_stops = self.store.get_trailing_stops().await?;

        let restart_scheduled = if should_restart {
            self.schedule_restart(&snapshot, now).await?
        } else {
            if snapshot.was_running && !snapshot.stopped_manually {
                tracing::warn!(
                    attempted_at = ?snapshot.restart_attempt_time,
                    "Bot restart skipped by restart policy"
                );
            }
            false
        };

        Ok(RecoverySummary {
            strategies_recovered: strategies.len(),
            trailing_stops_recovered: trailing_stops.len(),
            trailing_stops_rearmed: rearmed,
            open_positions: positions.len(),
            deactivated: report.total(),
            restart_scheduled,
            completed_at: Utc::now(),
        })
    }

    /// Fetch positions and deactivate state for pairs no longer open.
    ///
    /// The fetch runs with entries allowed; cleanup runs with entries paused.
    /// If an entry started after the fetch began, the fetch is repeated under
    /// the pause so a position opened in between is not taken for closed.
    async fn sync_positions(
        &self,
    ) -> Result<(Vec<ExchangePosition>, CleanupReport), RecoveryError> {
        let epoch = self.locks.pause_entries().await.epoch();
        let mut positions = self.fetch_positions().await?;

        let pause = self.locks.pause_entries().await;
        if pause.epoch() != epoch {
            tracing::debug!(
                entries = pause.epoch() - epoch,
                "Positions entered during fetch, fetching again"
            );
            positions = self.fetch_positions().await?;
        }
        let report = self.reconcile(&positions).await?;
        drop(pause);
        Ok((positions, report))
    }

    async fn fetch_positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError> {
        fetch_positions(self.exchange.as_ref(), &self.settings.position_sources).await
    }

    async fn reconcile(
        &self,
        positions: &[ExchangePosition],
    ) -> Result<CleanupReport, StateStoreError> {
        let report = self.store.cleanup_closed_positions(positions).await?;
        for pair in &report.strategies_deactivated {
            tracing::info!(pair = %pair, "Strategy deactivated, position no longer open");
        }
        for pair in &report.stops_deactivated {
            tracing::info!(pair = %pair, "Trailing stop deactivated, position no longer open");
        }
        observability::record_reconciliation_deactivations(report.total());
        Ok(report)
    }

    /// Recreate missing trailing stops for surviving trailing strategies.
    /// Existing stops are left untouched.
    async fn rearm(
        &self,
        strategies: &[ActiveStrategy],
        positions: &[ExchangePosition],
    ) -> Result<usize, RecoveryError> {
        let positions: HashMap<PairKey, &ExchangePosition> =
            positions.iter().map(|p| (p.key(), p)).collect();
        let mut rearmed = 0;

        for strategy in strategies {
            let StrategyParams::TrailingStop(params) = &strategy.params else {
                continue;
            };
            let key = strategy.key();
            let Some(position) = positions.get(&key) else {
                continue;
            };

            let _guard = self.locks.lock(&key).await;
            let armed = self
                .store
                .get_trailing_stops()
                .await?
                .iter()
                .any(|s| s.key() == key);
            if armed {
                continue;
            }

            let reference = if position.mark_price > Decimal::ZERO {
                position.mark_price
            } else {
                position.avg_price
            };
            match TrailingStop::new(
                key.symbol.clone(),
                key.side,
                reference,
                params.trail_distance,
            ) {
                Ok(stop) => {
                    self.store.save_trailing_stop(&stop).await?;
                    rearmed += 1;
                    tracing::info!(
                        pair = %key,
                        stop_price = %stop.current_stop_price,
                        reference_price = %reference,
                        "Trailing stop re-armed"
                    );
                }
                Err(e) => {
                    tracing::error!(pair = %key, error = %e, "Cannot re-arm trailing stop");
                }
            }
        }
        Ok(rearmed)
    }

    /// Persist the attempt, then launch the bot in the background.
    async fn schedule_restart(
        &self,
        snapshot: &RecoverySnapshot,
        now: DateTime<Utc>,
    ) -> Result<bool, StateStoreError> {
        let Some(config) = snapshot.bot_config.clone() else {
            return Ok(false);
        };
        self.store
            .save_recovery_snapshot(&snapshot.restart_attempted(now))
            .await?;

        tracing::info!(symbol = %config.symbol, "Scheduling bot restart");
        let control = Arc::clone(&self.bot_control);
        self.tasks.spawn(async move {
            match control.start_bot(&config).await {
                Ok(()) => tracing::info!(symbol = %config.symbol, "Bot restarted"),
                Err(e) => {
                    tracing::error!(symbol = %config.symbol, error = %e, "Bot restart failed");
                }
            }
        });
        Ok(true)
    }

    /// Run one monitoring tick: fetch, reconcile, evaluate stops.
    ///
    /// # Errors
    ///
    /// Returns the first exchange, store or stop error of the tick.
    pub async fn monitor_tick(&self) -> Result<(), RecoveryError> {
        let (positions, _) = self.sync_positions().await?;
        let report = self.controller.evaluate(&positions).await?;
        tracing::debug!(
            positions = positions.len(),
            evaluated = report.evaluated,
            raised = report.raised.len(),
            closed = report.closed.len(),
            failures = report.failures.len(),
            "Monitoring tick"
        );
        Ok(())
    }

    /// Run the monitoring loop until `shutdown` is cancelled. A failed tick
    /// is logged and delays the next one by the error backoff.
    pub async fn run_monitoring(&self, shutdown: CancellationToken) {
        *self.state.write() = RecoveryState::Monitoring;
        tracing::info!(
            interval_secs = self.settings.monitor_interval.as_secs(),
            "Recovery monitoring started"
        );

        loop {
            let delay = match self.monitor_tick().await {
                Ok(()) => {
                    observability::record_recovery_tick("ok");
                    self.settings.monitor_interval
                }
                Err(e) => {
                    observability::record_recovery_tick("error");
                    tracing::warn!(
                        error = %e,
                        backoff_secs = self.settings.error_backoff.as_secs(),
                        "Monitoring tick failed, positions may be stale data"
                    );
                    self.publish(TradeEvent::StaleData {
                        message: e.to_string(),
                    })
                    .await;
                    self.settings.monitor_interval + self.settings.error_backoff
                }
            };

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Recovery monitoring stopped");
    }

    async fn publish(&self, event: TradeEvent) {
        if let Err(e) = self.events.publish(event).await {
            tracing::warn!(error = %e, "Failed to publish recovery event");
        }
    }
}
