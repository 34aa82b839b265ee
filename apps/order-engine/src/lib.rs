// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_collect,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Order Engine - Order Lifecycle & Crash-Safe Position Recovery
//!
//! Places and tracks orders on a derivatives exchange, enforces trailing
//! stops, and restores consistent state after a crash.
//!
//! # Architecture (Clean Architecture + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Core business logic with no I/O
//!   - `order_execution`: Order aggregate, status lifecycle, execution stats
//!   - `stop_enforcement`: Trailing stop ratchet and trigger
//!   - `recovery`: Active strategies, recovery snapshot, restart policy
//!
//! - **Application**: Services and orchestration
//!   - `ports`: `ExchangePort`, `StateStorePort`, `BotControlPort`, `EventPublisherPort`
//!   - `services`: Execution engine, trailing stop controller, recovery manager
//!   - `use_cases`: Position entry/exit, bot lifecycle
//!
//! - **Infrastructure**: Adapters
//!   - `exchange`: Bybit v5 REST adapter, simulated exchange
//!   - `persistence`: SQLite and in-memory state stores
//!   - `http`: axum control plane
//!   - `config`: Dependency injection container

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Services, use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// YAML configuration loading and validation.
pub mod config;

/// Prometheus metrics.
pub mod observability;

/// Tracing subscriber setup.
pub mod telemetry;

pub use application::services::{OrderExecutionEngine, RecoveryManager, TrailingStopController};
pub use domain::order_execution::{Order, OrderStatus};
pub use domain::recovery::{ActiveStrategy, RecoverySnapshot};
pub use domain::stop_enforcement::TrailingStop;
