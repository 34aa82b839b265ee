//! Crash Recovery Integration Tests
//!
//! Drives recovery, reconciliation and stop monitoring through the container
//! against the simulated exchange and an in-memory SQLite store, the way the
//! binary wires them.

// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use rust_decimal_macros::dec;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use order_engine::application::ports::{
    BotControlPort, Category, ControlError, ExchangeError, ExchangeOrderState, ExchangePort,
    NoOpEventPublisher, PlaceOrderAck, PlaceOrderRequest, StateStorePort, Ticker,
};
use order_engine::application::services::RecoveryError;
use order_engine::domain::order_execution::OrderStatus;
use order_engine::domain::recovery::{
    ActiveStrategy, BotConfig, ExchangePosition, RecoverySnapshot, StrategyParams,
};
use order_engine::domain::shared::{ClientOrderId, ExchangeOrderId, Side, Symbol};
use order_engine::domain::stop_enforcement::TrailingStop;
use order_engine::infrastructure::config::{Container, ContainerSettings};
use order_engine::infrastructure::exchange::SimulatedExchange;
use order_engine::infrastructure::persistence::SqliteStateStore;

// =============================================================================
// Harness
// =============================================================================

#[derive(Default)]
struct RecordingBotControl {
    starts: Mutex<Vec<BotConfig>>,
}

impl RecordingBotControl {
    fn start_count(&self) -> usize {
        self.starts.lock().unwrap().len()
    }
}

#[async_trait]
impl BotControlPort for RecordingBotControl {
    async fn start_bot(&self, config: &BotConfig) -> Result<(), ControlError> {
        self.starts.lock().unwrap().push(config.clone());
        Ok(())
    }
}

/// Simulator whose next position fetch, once armed, holds its result until
/// released. Lets a test act between the read and the reconciliation.
#[derive(Default)]
struct StallingExchange {
    inner: SimulatedExchange,
    stall_next: AtomicBool,
    fetched: Notify,
    release: Notify,
}

impl StallingExchange {
    fn stall_next_fetch(&self) {
        self.stall_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExchangePort for StallingExchange {
    async fn place_order(&self, request: PlaceOrderRequest) -> Result<PlaceOrderAck, ExchangeError> {
        self.inner.place_order(request).await
    }

    async fn cancel_order(
        &self,
        category: Category,
        symbol: &Symbol,
        order_id: &ExchangeOrderId,
    ) -> Result<(), ExchangeError> {
        self.inner.cancel_order(category, symbol, order_id).await
    }

    async fn cancel_all_orders(
        &self,
        category: Category,
        symbol: Option<&Symbol>,
    ) -> Result<Vec<ExchangeOrderId>, ExchangeError> {
        self.inner.cancel_all_orders(category, symbol).await
    }

    async fn get_open_orders(
        &self,
        category: Category,
        symbol: &Symbol,
        order_id: Option<&ExchangeOrderId>,
    ) -> Result<Vec<ExchangeOrderState>, ExchangeError> {
        self.inner.get_open_orders(category, symbol, order_id).await
    }

    async fn get_order_by_client_id(
        &self,
        category: Category,
        symbol: &Symbol,
        client_order_id: &ClientOrderId,
    ) -> Result<Option<ExchangeOrderState>, ExchangeError> {
        self.inner
            .get_order_by_client_id(category, symbol, client_order_id)
            .await
    }

    async fn get_positions(
        &self,
        category: Category,
        settle_coin: Option<&str>,
    ) -> Result<Vec<ExchangePosition>, ExchangeError> {
        let positions = self.inner.get_positions(category, settle_coin).await?;
        if self.stall_next.swap(false, Ordering::SeqCst) {
            self.fetched.notify_one();
            self.release.notified().await;
        }
        Ok(positions)
    }

    async fn get_ticker(&self, category: Category, symbol: &Symbol) -> Result<Ticker, ExchangeError> {
        self.inner.get_ticker(category, symbol).await
    }
}

struct Harness {
    exchange: Arc<SimulatedExchange>,
    store: Arc<SqliteStateStore>,
    bot: Arc<RecordingBotControl>,
    tasks: TaskTracker,
    container: Container,
}

impl Harness {
    async fn new() -> Self {
        Self::with_settings(ContainerSettings::default()).await
    }

    async fn with_settings(mut settings: ContainerSettings) -> Self {
        let exchange = Arc::new(SimulatedExchange::new());
        let store = Arc::new(SqliteStateStore::in_memory().await.unwrap());
        let bot = Arc::new(RecordingBotControl::default());
        let tasks = TaskTracker::new();
        settings.execution.min_order_interval = Duration::ZERO;

        let container = Container::new(
            Arc::clone(&exchange) as _,
            Arc::clone(&store) as _,
            Arc::clone(&bot) as _,
            Arc::new(NoOpEventPublisher),
            settings,
            tasks.clone(),
        );
        Self {
            exchange,
            store,
            bot,
            tasks,
            container,
        }
    }

    /// Wait for scheduled restarts to finish.
    async fn drain_restarts(&self) {
        self.tasks.close();
        tokio::time::timeout(Duration::from_secs(5), self.tasks.wait())
            .await
            .expect("restart tasks finish");
        self.tasks.reopen();
    }

    async fn seed_btc_long(&self) {
        self.store
            .save_active_strategy(&ActiveStrategy::new(
                btc(),
                Side::Buy,
                dec!(100),
                dec!(1),
                StrategyParams::trailing(dec!(0.02)),
            ))
            .await
            .unwrap();
        self.store
            .save_trailing_stop(&TrailingStop::new(btc(), Side::Buy, dec!(100), dec!(0.02)).unwrap())
            .await
            .unwrap();
        self.exchange.set_price(&btc(), dec!(100));
        self.exchange
            .open_position(&btc(), Side::Buy, dec!(1), dec!(100));
    }

    async fn stops(&self) -> Vec<TrailingStop> {
        self.store.get_trailing_stops().await.unwrap()
    }

    async fn strategies(&self) -> Vec<ActiveStrategy> {
        self.store.get_active_strategies().await.unwrap()
    }
}

fn btc() -> Symbol {
    Symbol::new("BTCUSDT")
}

fn eth() -> Symbol {
    Symbol::new("ETHUSDT")
}

fn bot_config() -> BotConfig {
    BotConfig {
        symbol: btc(),
        quantity: dec!(0.01),
        side: Side::Buy,
        indicator_params: BTreeMap::new(),
    }
}

async fn crashed_while_running(store: &SqliteStateStore) {
    let snapshot = RecoverySnapshot::default().started(bot_config(), true);
    store.save_recovery_snapshot(&snapshot).await.unwrap();
}

// =============================================================================
// Initial recovery
// =============================================================================

#[tokio::test]
async fn crash_recovery_restores_position_and_restarts_bot_once() {
    let h = Harness::new().await;
    h.seed_btc_long().await;
    // Orphan: the exchange no longer reports this position.
    h.store
        .save_active_strategy(&ActiveStrategy::new(
            eth(),
            Side::Sell,
            dec!(3000),
            dec!(2),
            StrategyParams::trailing(dec!(0.03)),
        ))
        .await
        .unwrap();
    crashed_while_running(&h.store).await;

    let first = h.container.recovery().perform_initial_recovery().await.unwrap();
    h.drain_restarts().await;

    assert_eq!(first.strategies_recovered, 1);
    assert_eq!(first.trailing_stops_recovered, 1);
    assert_eq!(first.trailing_stops_rearmed, 0);
    assert_eq!(first.open_positions, 1);
    assert_eq!(first.deactivated, 1);
    assert!(first.restart_scheduled);
    assert_eq!(h.bot.start_count(), 1);

    let snapshot = h.store.get_recovery_snapshot().await.unwrap().unwrap();
    assert!(snapshot.auto_restart_attempted);
    assert!(snapshot.restart_attempt_time.is_some());

    // Second pass against unchanged exchange state is a no-op.
    let stops_before = h.stops().await;
    let second = h.container.recovery().perform_initial_recovery().await.unwrap();
    h.drain_restarts().await;

    assert_eq!(second.strategies_recovered, 1);
    assert_eq!(second.deactivated, 0);
    assert_eq!(second.trailing_stops_rearmed, 0);
    assert!(!second.restart_scheduled);
    assert_eq!(h.bot.start_count(), 1);
    assert_eq!(h.stops().await, stops_before);
    assert_eq!(h.exchange.placed_orders(), 0);
}

#[tokio::test]
async fn missing_stop_is_rearmed_from_mark_price() {
    let h = Harness::new().await;
    h.store
        .save_active_strategy(&ActiveStrategy::new(
            btc(),
            Side::Buy,
            dec!(100),
            dec!(1),
            StrategyParams::trailing(dec!(0.02)),
        ))
        .await
        .unwrap();
    h.exchange.set_price(&btc(), dec!(110));
    h.exchange
        .open_position(&btc(), Side::Buy, dec!(1), dec!(100));

    let summary = h.container.recovery().perform_initial_recovery().await.unwrap();

    assert_eq!(summary.trailing_stops_rearmed, 1);
    let stops = h.stops().await;
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].current_stop_price, dec!(107.8));
    assert_eq!(stops[0].best_price, dec!(110));

    let again = h.container.recovery().perform_initial_recovery().await.unwrap();
    assert_eq!(again.trailing_stops_rearmed, 0);
    assert_eq!(h.stops().await.len(), 1);
}

#[tokio::test]
async fn failed_position_fetch_leaves_state_untouched() {
    let h = Harness::new().await;
    h.seed_btc_long().await;
    crashed_while_running(&h.store).await;
    h.exchange.set_failure(Some(ExchangeError::Timeout {
        operation: "/v5/position/list".to_string(),
    }));

    let result = h.container.recovery().perform_initial_recovery().await;
    h.drain_restarts().await;

    assert!(matches!(result, Err(RecoveryError::Exchange(_))));
    assert_eq!(h.strategies().await.len(), 1);
    assert_eq!(h.stops().await.len(), 1);
    assert_eq!(h.bot.start_count(), 0);
    let snapshot = h.store.get_recovery_snapshot().await.unwrap().unwrap();
    assert!(!snapshot.auto_restart_attempted);
}

#[tokio::test]
async fn manual_stop_prevents_restart() {
    let h = Harness::new().await;
    let snapshot = RecoverySnapshot::default()
        .started(bot_config(), true)
        .stopped_manually();
    h.store.save_recovery_snapshot(&snapshot).await.unwrap();

    let summary = h.container.recovery().perform_initial_recovery().await.unwrap();
    h.drain_restarts().await;

    assert!(!summary.restart_scheduled);
    assert_eq!(h.bot.start_count(), 0);
}

#[tokio::test]
async fn restart_is_throttled_until_window_passes() {
    let h = Harness::new().await;
    let recent = RecoverySnapshot::default()
        .started(bot_config(), true)
        .restart_attempted(Utc::now() - TimeDelta::seconds(30));
    h.store.save_recovery_snapshot(&recent).await.unwrap();

    let throttled = h.container.recovery().perform_initial_recovery().await.unwrap();
    assert!(!throttled.restart_scheduled);

    let stale = recent.restart_attempted(Utc::now() - TimeDelta::minutes(3));
    h.store.save_recovery_snapshot(&stale).await.unwrap();

    let allowed = h.container.recovery().perform_initial_recovery().await.unwrap();
    h.drain_restarts().await;
    assert!(allowed.restart_scheduled);
    assert_eq!(h.bot.start_count(), 1);
}

#[tokio::test]
async fn automatic_start_keeps_throttle_and_manual_start_clears_it() {
    let h = Harness::new().await;
    let lifecycle = h.container.lifecycle();
    let attempted = RecoverySnapshot::default()
        .started(bot_config(), true)
        .restart_attempted(Utc::now());
    h.store.save_recovery_snapshot(&attempted).await.unwrap();

    let automatic = lifecycle.record_started(bot_config(), false).await.unwrap();
    assert!(automatic.auto_restart_attempted);

    let manual = lifecycle.record_started(bot_config(), true).await.unwrap();
    assert!(!manual.auto_restart_attempted);
    assert!(manual.restart_attempt_time.is_none());
}

// =============================================================================
// Monitoring
// =============================================================================

#[tokio::test]
async fn monitoring_ratchets_then_closes_on_trigger() {
    let h = Harness::new().await;
    h.seed_btc_long().await;
    let recovery = h.container.recovery();
    recovery.perform_initial_recovery().await.unwrap();

    h.exchange.set_price(&btc(), dec!(110));
    recovery.monitor_tick().await.unwrap();
    assert_eq!(h.stops().await[0].current_stop_price, dec!(107.8));

    // A pullback that stays above the stop holds it.
    h.exchange.set_price(&btc(), dec!(108));
    recovery.monitor_tick().await.unwrap();
    assert_eq!(h.stops().await[0].current_stop_price, dec!(107.8));

    h.exchange.set_price(&btc(), dec!(107));
    recovery.monitor_tick().await.unwrap();

    assert!(h.stops().await.is_empty());
    assert!(h.strategies().await.is_empty());
    assert!(
        h.exchange
            .get_positions(Category::Linear, Some("USDT"))
            .await
            .unwrap()
            .is_empty()
    );
    let orders = h.exchange.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].side, Side::Sell);
    assert_eq!(orders[0].status, OrderStatus::Filled);
}

#[tokio::test]
async fn externally_closed_position_is_reconciled_on_tick() {
    let h = Harness::new().await;
    h.seed_btc_long().await;
    let recovery = h.container.recovery();
    recovery.perform_initial_recovery().await.unwrap();

    h.exchange.close_position_externally(&btc(), Side::Buy);
    recovery.monitor_tick().await.unwrap();

    assert!(h.strategies().await.is_empty());
    assert!(h.stops().await.is_empty());
    assert_eq!(h.exchange.placed_orders(), 0);
}

#[tokio::test]
async fn stop_without_trade_is_left_armed() {
    let h = Harness::new().await;
    h.exchange.set_price(&btc(), dec!(100));
    h.exchange
        .open_position(&btc(), Side::Buy, dec!(1), dec!(100));
    h.store
        .save_trailing_stop(&TrailingStop::new(btc(), Side::Buy, dec!(100), dec!(0.02)).unwrap())
        .await
        .unwrap();

    h.exchange.set_price(&btc(), dec!(97));
    let positions = h
        .exchange
        .get_positions(Category::Linear, Some("USDT"))
        .await
        .unwrap();
    let report = h
        .container
        .trailing_stops()
        .evaluate(&positions)
        .await
        .unwrap();

    assert_eq!(report.triggered.len(), 1);
    assert!(report.closed.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].1.contains("No active trade"));
    assert_eq!(h.stops().await.len(), 1);
    assert_eq!(h.exchange.placed_orders(), 0);

    // The loop boundary swallows the per-pair failure.
    assert!(h.container.recovery().monitor_tick().await.is_ok());
}

#[tokio::test]
async fn failed_close_keeps_stop_for_next_tick() {
    let h = Harness::new().await;
    h.seed_btc_long().await;
    h.exchange.set_price(&btc(), dec!(97));
    h.exchange
        .reject_next_order(110_017, "reduce-only order rejected");

    let recovery = h.container.recovery();
    recovery.monitor_tick().await.unwrap();
    assert_eq!(h.stops().await.len(), 1);
    assert_eq!(h.strategies().await.len(), 1);

    recovery.monitor_tick().await.unwrap();
    assert!(h.stops().await.is_empty());
    assert!(h.strategies().await.is_empty());
}

#[tokio::test]
async fn entry_during_position_fetch_survives_reconciliation() {
    let exchange = Arc::new(StallingExchange::default());
    let store = Arc::new(SqliteStateStore::in_memory().await.unwrap());
    let mut settings = ContainerSettings::default();
    settings.execution.min_order_interval = Duration::ZERO;
    let container = Container::new(
        Arc::clone(&exchange) as _,
        Arc::clone(&store) as _,
        Arc::new(RecordingBotControl::default()),
        Arc::new(NoOpEventPublisher),
        settings,
        TaskTracker::new(),
    );
    exchange.inner.set_price(&btc(), dec!(100));
    exchange.stall_next_fetch();

    let tick = {
        let recovery = container.recovery();
        tokio::spawn(async move { recovery.monitor_tick().await })
    };
    exchange.fetched.notified().await;

    // The tick holds a snapshot taken before this position existed.
    container
        .positions()
        .enter_position(btc(), Side::Buy, dec!(1), None)
        .await
        .unwrap();
    exchange.release.notify_one();
    tokio::time::timeout(Duration::from_secs(5), tick)
        .await
        .expect("tick finishes")
        .unwrap()
        .unwrap();

    assert_eq!(store.get_active_strategies().await.unwrap().len(), 1);
    let stops = store.get_trailing_stops().await.unwrap();
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].current_stop_price, dec!(98));

    // The stop is still enforced afterwards.
    exchange.inner.set_price(&btc(), dec!(97));
    container.recovery().monitor_tick().await.unwrap();
    assert!(store.get_trailing_stops().await.unwrap().is_empty());
    assert!(
        exchange
            .get_positions(Category::Linear, Some("USDT"))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn monitoring_loop_survives_exchange_outage() {
    let mut settings = ContainerSettings::default();
    settings.recovery.monitor_interval = Duration::from_millis(20);
    settings.recovery.error_backoff = Duration::from_millis(20);
    let h = Harness::with_settings(settings).await;
    h.seed_btc_long().await;
    let recovery = h.container.recovery();
    let shutdown = CancellationToken::new();
    h.exchange.set_failure(Some(ExchangeError::Connection {
        message: "unreachable".to_string(),
    }));

    let worker = {
        let recovery = Arc::clone(&recovery);
        let token = shutdown.clone();
        tokio::spawn(async move { recovery.run_monitoring(token).await })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!worker.is_finished());
    assert_eq!(h.stops().await[0].current_stop_price, dec!(98));

    h.exchange.set_failure(None);
    h.exchange.set_price(&btc(), dec!(110));
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.stops().await[0].current_stop_price != dec!(107.8) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stop ratchets once the exchange is back");

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .expect("monitoring stops on shutdown")
        .unwrap();
}
