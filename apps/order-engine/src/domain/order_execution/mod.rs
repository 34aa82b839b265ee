//! Order Execution Bounded Context
//!
//! The order aggregate, its status lifecycle, slippage and execution statistics.

mod errors;
mod order;
mod slippage;
mod state_machine;
mod stats;
mod value_objects;

pub use errors::OrderError;
pub use order::Order;
pub use slippage::slippage;
pub use state_machine::OrderStateMachine;
pub use stats::ExecutionStats;
pub use value_objects::{OrderStatus, OrderType, TimeInForce};
