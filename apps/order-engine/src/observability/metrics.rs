//! Prometheus metrics for the order engine.

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
    /// Histogram buckets for latency measurements (in seconds).
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9090)),
            // 1ms to 15s, the upper end being the exchange timeout
            latency_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0,
            ],
        }
    }
}

impl MetricsConfig {
    /// Create a configuration listening on `port` on all interfaces.
    #[must_use]
    pub fn with_port(port: u16) -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            ..Default::default()
        }
    }
}

/// Initialize the Prometheus metrics exporter.
///
/// Starts an HTTP listener exposing metrics at `/metrics`.
///
/// # Errors
///
/// Returns an error if the exporter fails to start (e.g., port already in use).
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .set_buckets(&config.latency_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(addr = %config.listen_addr, "Prometheus metrics exporter started");
    Ok(())
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

// ============================================================================
// Order Execution Metrics
// ============================================================================

/// Record an order submission and its acknowledgement latency.
pub fn record_order_submission(order_type: &str, status: &str, latency_seconds: f64) {
    counter!(
        "order_submissions_total",
        "order_type" => order_type.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!("order_ack_latency_seconds", "order_type" => order_type.to_string())
        .record(latency_seconds);
}

/// Record a filled order with its slippage, if known.
pub fn record_order_fill(symbol: &str, slippage: Option<f64>) {
    counter!("order_fills_total", "symbol" => symbol.to_string()).increment(1);
    if let Some(slippage) = slippage {
        histogram!("order_slippage_ratio", "symbol" => symbol.to_string()).record(slippage);
    }
}

/// Record an order rejection.
pub fn record_order_rejection(reason: &str) {
    counter!("order_rejections_total", "reason" => reason.to_string()).increment(1);
}

/// Update the open orders gauge.
pub fn update_open_orders(count: usize) {
    gauge!("open_orders").set(count as f64);
}

// ============================================================================
// Stop & Recovery Metrics
// ============================================================================

/// Record a stop or target trigger.
pub fn record_stop_trigger(kind: &str, outcome: &str) {
    counter!(
        "stop_triggers_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a monitoring loop tick.
pub fn record_recovery_tick(outcome: &str) {
    counter!("recovery_ticks_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record rows deactivated by reconciliation.
pub fn record_reconciliation_deactivations(count: usize) {
    counter!("reconciliation_deactivations_total").increment(count as u64);
}
