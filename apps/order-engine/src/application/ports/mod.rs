//! Application Ports (Driven)
//!
//! Interfaces the application uses to reach external systems.

mod bot_control_port;
mod event_publisher_port;
mod exchange_port;
mod state_store_port;

pub use bot_control_port::{BotControlPort, ControlError};
pub use event_publisher_port::{
    EventPublishError, EventPublisherPort, NoOpEventPublisher, TradeEvent,
};
pub use exchange_port::{
    Category, ExchangeError, ExchangeOrderState, ExchangePort, PlaceOrderAck, PlaceOrderRequest,
    Ticker,
};
pub use state_store_port::{CleanupReport, StateStoreError, StateStorePort, open_pairs};
