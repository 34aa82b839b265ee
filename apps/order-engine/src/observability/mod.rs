//! Observability module for metrics.
//!
//! Counters, gauges and histograms for order execution, stop enforcement
//! and recovery, with an optional Prometheus exporter. Recording is a no-op
//! until an exporter is installed.

mod metrics;

pub use metrics::{
    MetricsConfig, MetricsError, init_metrics, record_order_fill, record_order_rejection,
    record_order_submission, record_reconciliation_deactivations, record_recovery_tick,
    record_stop_trigger, update_open_orders,
};
