//! Event publishing adapters.

mod broadcast;
mod logging;

pub use broadcast::BroadcastEventPublisher;
pub use logging::run_event_log;
