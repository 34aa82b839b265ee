//! Domain Layer
//!
//! Pure business types and rules. Nothing in here performs I/O.
//!
//! - `shared`: symbols, sides, identifiers and domain errors
//! - `order_execution`: order aggregate, status lifecycle, slippage and stats
//! - `stop_enforcement`: trailing stops and fixed trigger levels
//! - `recovery`: active strategies, recovery snapshots and the restart policy

pub mod order_execution;
pub mod recovery;
pub mod shared;
pub mod stop_enforcement;
