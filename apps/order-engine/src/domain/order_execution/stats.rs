//! Execution statistics computed from order history.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Order, OrderStatus};

/// Aggregate execution quality figures.
///
/// Derived on demand from the terminal order history; nothing here is
/// maintained incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Orders in history.
    pub total_orders: usize,
    /// Orders that filled completely.
    pub filled_orders: usize,
    /// Orders cancelled before a full fill.
    pub cancelled_orders: usize,
    /// Orders rejected by the exchange.
    pub rejected_orders: usize,
    /// `filled_orders / total_orders`, zero with no history.
    pub fill_rate: f64,
    /// Mean submission-to-acknowledgement latency in milliseconds.
    pub avg_latency_ms: f64,
    /// Mean slippage over orders that have one.
    pub avg_slippage: Option<Decimal>,
    /// Orders currently tracked as open.
    pub open_orders: usize,
}

impl ExecutionStats {
    /// Compute statistics from history plus the current open-order count.
    #[must_use]
    pub fn from_history<'a>(history: impl IntoIterator<Item = &'a Order>, open_orders: usize) -> Self {
        let mut total_orders = 0usize;
        let mut filled_orders = 0usize;
        let mut cancelled_orders = 0usize;
        let mut rejected_orders = 0usize;
        let mut latency_sum = 0u64;
        let mut latency_count = 0u64;
        let mut slippage_sum = Decimal::ZERO;
        let mut slippage_count = 0u32;

        for order in history {
            total_orders += 1;
            match order.status() {
                OrderStatus::Filled => filled_orders += 1,
                OrderStatus::Cancelled => cancelled_orders += 1,
                OrderStatus::Rejected => rejected_orders += 1,
                OrderStatus::Pending | OrderStatus::PartiallyFilled => {}
            }
            if let Some(latency) = order.latency_ms() {
                latency_sum += latency;
                latency_count += 1;
            }
            if let Some(slippage) = order.slippage() {
                slippage_sum += slippage;
                slippage_count += 1;
            }
        }

        let fill_rate = if total_orders == 0 {
            0.0
        } else {
            filled_orders as f64 / total_orders as f64
        };
        let avg_latency_ms = if latency_count == 0 {
            0.0
        } else {
            latency_sum as f64 / latency_count as f64
        };
        let avg_slippage =
            (slippage_count > 0).then(|| slippage_sum / Decimal::from(slippage_count));

        Self {
            total_orders,
            filled_orders,
            cancelled_orders,
            rejected_orders,
            fill_rate,
            avg_latency_ms,
            avg_slippage,
            open_orders,
        }
    }
}
