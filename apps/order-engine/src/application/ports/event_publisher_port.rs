//! Event Publisher Port (Driven Port)
//!
//! Trade and notification events consumed by dashboards and notifiers.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::recovery::StrategyKind;
use crate::domain::shared::{ClientOrderId, Side, Symbol};

/// Events emitted by this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TradeEvent {
    /// An order filled completely.
    OrderFilled {
        /// Client order id.
        client_order_id: ClientOrderId,
        /// Instrument.
        symbol: Symbol,
        /// Order side.
        side: Side,
        /// Filled quantity.
        quantity: Decimal,
        /// Average fill price.
        price: Option<Decimal>,
        /// Realized slippage.
        slippage: Option<Decimal>,
    },
    /// The exchange rejected an order.
    OrderRejected {
        /// Client order id.
        client_order_id: ClientOrderId,
        /// Instrument.
        symbol: Symbol,
        /// Order side.
        side: Side,
        /// Exchange message.
        reason: String,
    },
    /// An order was cancelled.
    OrderCancelled {
        /// Client order id.
        client_order_id: ClientOrderId,
        /// Instrument.
        symbol: Symbol,
    },
    /// A position was closed by one of its strategies.
    PositionClosed {
        /// Instrument.
        symbol: Symbol,
        /// Position side.
        side: Side,
        /// Strategy that fired.
        trigger: StrategyKind,
        /// Price that fired it.
        price: Decimal,
    },
    /// Initial recovery finished.
    RecoveryCompleted {
        /// Strategies still backed by a position.
        strategies_recovered: usize,
        /// Active trailing stops after recovery.
        trailing_stops_recovered: usize,
        /// Open exchange positions.
        open_positions: usize,
        /// Whether a bot restart was scheduled.
        restart_scheduled: bool,
    },
    /// Exchange data could not be refreshed.
    StaleData {
        /// Failure detail.
        message: String,
    },
}

/// Event publishing error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventPublishError {
    /// Publishing failed.
    #[error("Event publish failed: {message}")]
    PublishFailed {
        /// Error details.
        message: String,
    },
}

/// Port for publishing trade events.
#[async_trait]
pub trait EventPublisherPort: Send + Sync {
    /// Publish one event.
    async fn publish(&self, event: TradeEvent) -> Result<(), EventPublishError>;
}

/// No-op event publisher for testing.
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisherPort for NoOpEventPublisher {
    async fn publish(&self, _event: TradeEvent) -> Result<(), EventPublishError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_op_publisher_succeeds() {
        let publisher = NoOpEventPublisher;
        let event = TradeEvent::StaleData {
            message: "positions unavailable".to_string(),
        };
        assert!(publisher.publish(event).await.is_ok());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = TradeEvent::PositionClosed {
            symbol: Symbol::new("BTCUSDT"),
            side: Side::Buy,
            trigger: StrategyKind::TrailingStop,
            price: Decimal::ONE_HUNDRED,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "position_closed");
        assert_eq!(json["trigger"], "trailing_stop");
    }
}
