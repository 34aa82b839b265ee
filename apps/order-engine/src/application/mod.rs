//! Application Layer
//!
//! Orchestrates domain logic against the outside world.
//!
//! - **Ports**: interfaces for the exchange, the state store, the bot
//!   control plane and event consumers
//! - **Services**: the execution engine, the trailing stop controller, the
//!   recovery manager and their background workers
//! - **Use Cases**: entering/exiting positions and bot lifecycle transitions

pub mod ports;
pub mod services;
pub mod use_cases;

pub use ports::*;
pub use services::*;
pub use use_cases::*;
