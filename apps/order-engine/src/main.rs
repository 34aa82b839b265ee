//! Order Engine Binary
//!
//! Starts the order engine: runs crash recovery, then serves the control
//! plane while the order monitor and recovery monitoring loop run in the
//! background.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin order-engine
//! ```
//!
//! # Environment Variables
//!
//! - `ORDER_ENGINE_CONFIG`: Config file path (default: config.yaml)
//! - `BYBIT_API_KEY` / `BYBIT_API_SECRET`: Exchange credentials, via config interpolation
//! - `RUST_LOG`: Log filter, overrides `observability.logging.level`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use order_engine::application::ports::{BotControlPort, ExchangePort};
use order_engine::application::services::Supervisor;
use order_engine::config::{Config, ExchangeMode, load_config};
use order_engine::infrastructure::config::{Container, ContainerSettings};
use order_engine::infrastructure::control::{HttpBotLauncher, UnconfiguredBotControl};
use order_engine::infrastructure::events::{BroadcastEventPublisher, run_event_log};
use order_engine::infrastructure::exchange::{BybitExchangeAdapter, SimulatedExchange};
use order_engine::infrastructure::http::create_router;
use order_engine::infrastructure::persistence::SqliteStateStore;
use order_engine::observability::init_metrics;
use order_engine::telemetry::init_tracing;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let config = load_config(None).context("failed to load configuration")?;
    init_tracing(&config.observability.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        exchange = ?config.exchange.mode,
        category = %config.exchange.category,
        "Starting order engine"
    );

    if config.observability.metrics.enabled {
        init_metrics(&config.observability.metrics.to_metrics_config())
            .context("failed to start metrics exporter")?;
        tracing::info!(port = config.observability.metrics.port, "Metrics exporter started");
    }

    // Without durable state there is nothing to recover into.
    let store = Arc::new(
        SqliteStateStore::connect(
            &config.persistence.database_url,
            config.persistence.max_connections,
        )
        .await
        .context("state store unavailable")?,
    );
    tracing::info!(url = %config.persistence.database_url, "State store opened");

    let exchange = build_exchange(&config)?;
    let bot_control = build_bot_control(&config)?;
    let events = Arc::new(BroadcastEventPublisher::default());

    let supervisor = Supervisor::new();
    supervisor.spawn(
        "event-log",
        run_event_log(events.subscribe(), supervisor.shutdown_token()),
    );

    let container = Container::new(
        exchange,
        Arc::clone(&store) as _,
        bot_control,
        events,
        ContainerSettings::from_config(&config),
        supervisor.tracker(),
    );

    if config.recovery.enabled {
        let recovery = container.recovery();
        match recovery.perform_initial_recovery().await {
            Ok(summary) => tracing::info!(
                strategies = summary.strategies_recovered,
                trailing_stops = summary.trailing_stops_recovered,
                open_positions = summary.open_positions,
                deactivated = summary.deactivated,
                restart_scheduled = summary.restart_scheduled,
                "Initial recovery finished"
            ),
            Err(e) => tracing::error!(error = %e, "Initial recovery failed, monitoring will retry"),
        }

        let token = supervisor.shutdown_token();
        supervisor.spawn("recovery-monitor", async move {
            recovery.run_monitoring(token).await;
        });
    } else {
        tracing::warn!("Recovery disabled, persisted state is not reconciled");
    }

    supervisor.spawn(
        "order-monitor",
        container.order_monitor().run(supervisor.shutdown_token()),
    );

    start_http_server(&config, &container, &supervisor).await?;

    await_shutdown(supervisor.shutdown_token()).await;

    if !supervisor.shutdown(SHUTDOWN_TIMEOUT).await {
        tracing::warn!("Shutdown timed out, exiting with workers still running");
    }
    store.close().await;

    tracing::info!("Order engine stopped");
    Ok(())
}

/// Build the exchange adapter selected by `exchange.mode`.
fn build_exchange(config: &Config) -> anyhow::Result<Arc<dyn ExchangePort>> {
    match config.exchange.mode {
        ExchangeMode::Bybit => {
            let bybit = config.exchange.to_bybit_config();
            tracing::info!(
                base_url = %bybit.base_url,
                testnet = bybit.is_testnet(),
                "Using Bybit exchange"
            );
            let adapter =
                BybitExchangeAdapter::new(&bybit).context("failed to build Bybit client")?;
            Ok(Arc::new(adapter))
        }
        ExchangeMode::Simulated => {
            tracing::warn!("Using simulated exchange, no orders reach a venue");
            Ok(Arc::new(SimulatedExchange::new()))
        }
    }
}

/// Build the bot control client, or a stand-in that refuses every start.
fn build_bot_control(config: &Config) -> anyhow::Result<Arc<dyn BotControlPort>> {
    if let Some(url) = config.control.start_url() {
        let launcher = HttpBotLauncher::new(url, config.control.timeout())
            .context("failed to build bot control client")?;
        tracing::info!(url, "Bot control endpoint configured");
        Ok(Arc::new(launcher))
    } else {
        tracing::warn!("No bot_control_url configured, automatic restarts will fail");
        Ok(Arc::new(UnconfiguredBotControl))
    }
}

/// Bind the control plane and serve it until shutdown.
async fn start_http_server(
    config: &Config,
    container: &Container,
    supervisor: &Supervisor,
) -> anyhow::Result<()> {
    let app = create_router(container.app_state(env!("CARGO_PKG_VERSION")));
    let addr = config.server.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(%addr, "HTTP server starting");

    let token = supervisor.shutdown_token();
    supervisor.spawn("http", async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(token.cancelled_owned());
        if let Err(e) = server.await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGTERM, SIGINT, or an internal cancellation.
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. A process that cannot
/// observe termination signals cannot shut down cleanly.
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown.cancelled() => {}
    }

    shutdown.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
