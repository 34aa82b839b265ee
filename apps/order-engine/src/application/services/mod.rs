//! Application Services
//!
//! Order execution, stop enforcement, recovery and the workers that drive
//! them.

mod execution_engine;
mod order_monitor;
mod pair_locks;
mod rate_limiter;
mod recovery_manager;
mod supervisor;
mod trailing_stop_controller;

pub use execution_engine::{ExecutionError, ExecutionSettings, OrderExecutionEngine};
pub use order_monitor::{OrderMonitor, OrderMonitorConfig};
pub use pair_locks::{EntryGuard, EntryPause, PairLocks};
pub use rate_limiter::OrderRateLimiter;
pub(crate) use recovery_manager::fetch_positions;
pub use recovery_manager::{
    PositionSource, RecoveryError, RecoveryManager, RecoverySettings, RecoveryState,
    RecoverySummary,
};
pub use supervisor::Supervisor;
pub use trailing_stop_controller::{StopError, TickReport, TrailingStopController};
