//! Application Use Cases
//!
//! Use cases orchestrate services on behalf of external callers.

mod bot_lifecycle;
mod manage_position;

pub use bot_lifecycle::BotLifecycleService;
pub use manage_position::{PositionEntry, PositionError, PositionExit, PositionService};
