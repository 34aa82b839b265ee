//! Background worker that follows open orders to a terminal status.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::OrderExecutionEngine;

/// Order monitor timing.
#[derive(Debug, Clone, Copy)]
pub struct OrderMonitorConfig {
    /// Delay between polls.
    pub interval: Duration,
    /// Delay after a failed poll.
    pub error_backoff: Duration,
}

impl Default for OrderMonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Polls the exchange for every open order until shutdown.
#[derive(Debug)]
pub struct OrderMonitor {
    engine: Arc<OrderExecutionEngine>,
    config: OrderMonitorConfig,
}

impl OrderMonitor {
    /// Create a monitor for `engine`.
    #[must_use]
    pub const fn new(engine: Arc<OrderExecutionEngine>, config: OrderMonitorConfig) -> Self {
        Self { engine, config }
    }

    /// Run until `shutdown` is cancelled. Exchange errors never end the loop.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            interval_ms = self.config.interval.as_millis(),
            "Order monitor started"
        );

        loop {
            let delay = match self.engine.poll_open_orders().await {
                Ok(retired) => {
                    if retired > 0 {
                        tracing::debug!(retired, "Retired terminal orders");
                    }
                    self.config.interval
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        backoff_secs = self.config.error_backoff.as_secs(),
                        "Order monitor poll failed, backing off"
                    );
                    self.config.error_backoff
                }
            };

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Order monitor stopped");
    }
}
