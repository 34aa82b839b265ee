//! Dependency Injection Container
//!
//! Manages creation and wiring of all application components.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio_util::task::TaskTracker;

use crate::application::ports::{BotControlPort, EventPublisherPort, ExchangePort, StateStorePort};
use crate::application::services::{
    ExecutionSettings, OrderExecutionEngine, OrderMonitor, OrderMonitorConfig, PairLocks,
    RecoveryManager, RecoverySettings, TrailingStopController,
};
use crate::application::use_cases::{BotLifecycleService, PositionService};
use crate::config::Config;
use crate::infrastructure::http::AppState;

/// Service settings derived from the loaded configuration.
#[derive(Debug, Clone)]
pub struct ContainerSettings {
    /// Execution engine settings.
    pub execution: ExecutionSettings,
    /// Order monitor timing.
    pub monitor: OrderMonitorConfig,
    /// Recovery manager settings.
    pub recovery: RecoverySettings,
    /// Trail distance for entries without an explicit strategy.
    pub default_trail_distance: Decimal,
}

impl ContainerSettings {
    /// Derive settings from `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            execution: config.execution.to_settings(config.exchange.category),
            monitor: config.execution.to_monitor_config(),
            recovery: config
                .recovery
                .to_settings(config.exchange.position_categories.clone()),
            default_trail_distance: config.stops.default_trail_distance,
        }
    }
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Dependency injection container.
///
/// Holds the ports and the services built on them. Every service sharing a
/// pair shares the same `PairLocks`.
pub struct Container {
    // Ports
    exchange: Arc<dyn ExchangePort>,
    store: Arc<dyn StateStorePort>,
    events: Arc<dyn EventPublisherPort>,

    // Services
    engine: Arc<OrderExecutionEngine>,
    controller: Arc<TrailingStopController>,
    recovery: Arc<RecoveryManager>,
    positions: Arc<PositionService>,
    lifecycle: Arc<BotLifecycleService>,
    monitor_config: OrderMonitorConfig,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("engine", &self.engine)
            .field("recovery", &self.recovery)
            .finish_non_exhaustive()
    }
}

impl Container {
    /// Wire every service. Restarts scheduled by recovery run on `tasks`.
    #[must_use]
    pub fn new(
        exchange: Arc<dyn ExchangePort>,
        store: Arc<dyn StateStorePort>,
        bot_control: Arc<dyn BotControlPort>,
        events: Arc<dyn EventPublisherPort>,
        settings: ContainerSettings,
        tasks: TaskTracker,
    ) -> Self {
        let locks = Arc::new(PairLocks::new());
        let position_sources = settings.recovery.position_sources.clone();
        let engine = Arc::new(OrderExecutionEngine::new(
            Arc::clone(&exchange),
            Arc::clone(&events),
            settings.execution,
        ));
        let controller = Arc::new(TrailingStopController::new(
            Arc::clone(&store),
            Arc::clone(&engine),
            Arc::clone(&events),
            Arc::clone(&locks),
        ));
        let recovery = Arc::new(RecoveryManager::new(
            Arc::clone(&exchange),
            Arc::clone(&store),
            Arc::clone(&controller),
            bot_control,
            Arc::clone(&events),
            Arc::clone(&locks),
            settings.recovery,
            tasks,
        ));
        let positions = Arc::new(PositionService::new(
            Arc::clone(&engine),
            Arc::clone(&controller),
            Arc::clone(&exchange),
            Arc::clone(&store),
            locks,
            position_sources,
            settings.default_trail_distance,
        ));
        let lifecycle = Arc::new(BotLifecycleService::new(Arc::clone(&store)));

        Self {
            exchange,
            store,
            events,
            engine,
            controller,
            recovery,
            positions,
            lifecycle,
            monitor_config: settings.monitor,
        }
    }

    /// Get the exchange port.
    pub fn exchange(&self) -> Arc<dyn ExchangePort> {
        Arc::clone(&self.exchange)
    }

    /// Get the state store port.
    pub fn store(&self) -> Arc<dyn StateStorePort> {
        Arc::clone(&self.store)
    }

    /// Get the event publisher port.
    pub fn event_publisher(&self) -> Arc<dyn EventPublisherPort> {
        Arc::clone(&self.events)
    }

    /// Get the execution engine.
    pub fn engine(&self) -> Arc<OrderExecutionEngine> {
        Arc::clone(&self.engine)
    }

    /// Get the trailing stop controller.
    pub fn trailing_stops(&self) -> Arc<TrailingStopController> {
        Arc::clone(&self.controller)
    }

    /// Get the recovery manager.
    pub fn recovery(&self) -> Arc<RecoveryManager> {
        Arc::clone(&self.recovery)
    }

    /// Get the position use case.
    pub fn positions(&self) -> Arc<PositionService> {
        Arc::clone(&self.positions)
    }

    /// Get the bot lifecycle use case.
    pub fn lifecycle(&self) -> Arc<BotLifecycleService> {
        Arc::clone(&self.lifecycle)
    }

    /// Create an `OrderMonitor` for the engine.
    pub fn order_monitor(&self) -> OrderMonitor {
        OrderMonitor::new(Arc::clone(&self.engine), self.monitor_config)
    }

    /// Create the HTTP handler state.
    pub fn app_state(&self, version: impl Into<String>) -> AppState {
        AppState {
            engine: self.engine(),
            positions: self.positions(),
            lifecycle: self.lifecycle(),
            recovery: self.recovery(),
            version: version.into(),
        }
    }
}
