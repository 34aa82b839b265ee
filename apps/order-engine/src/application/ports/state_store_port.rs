//! State Store Port (Driven Port)
//!
//! Durable storage for active strategies, trailing stops and the recovery
//! snapshot. Rows are keyed by (symbol, side); a new write for a pair
//! deactivates the previous row instead of deleting it.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::recovery::{ActiveStrategy, ExchangePosition, RecoverySnapshot};
use crate::domain::shared::{PairKey, Side, Symbol};
use crate::domain::stop_enforcement::TrailingStop;

// ============================================================================
// Errors
// ============================================================================

/// Errors from state store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateStoreError {
    /// Store unreachable or failed to open.
    #[error("State store connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("State store query error: {0}")]
    Query(String),

    /// Stored data could not be encoded or decoded.
    #[error("State store serialization error: {0}")]
    Serialization(String),

    /// Stored data violates an invariant.
    #[error("State store integrity error: {0}")]
    Integrity(String),
}

impl From<serde_json::Error> for StateStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// ============================================================================
// Cleanup Report
// ============================================================================

/// Outcome of reconciling local state against exchange positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Pairs whose active strategy was deactivated.
    pub strategies_deactivated: Vec<PairKey>,
    /// Pairs whose trailing stop was deactivated.
    pub stops_deactivated: Vec<PairKey>,
}

impl CleanupReport {
    /// Total rows deactivated.
    #[must_use]
    pub fn total(&self) -> usize {
        self.strategies_deactivated.len() + self.stops_deactivated.len()
    }

    /// Whether nothing was deactivated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Pairs present in a set of exchange positions.
#[must_use]
pub fn open_pairs(positions: &[ExchangePosition]) -> HashSet<PairKey> {
    positions.iter().map(ExchangePosition::key).collect()
}

// ============================================================================
// Port
// ============================================================================

/// Port for durable strategy state.
///
/// Implementations must allow concurrent readers alongside the recovery
/// loop's writes.
#[async_trait]
pub trait StateStorePort: Send + Sync {
    /// Save a strategy, deactivating any active one for the same pair.
    async fn save_active_strategy(&self, strategy: &ActiveStrategy)
    -> Result<(), StateStoreError>;

    /// All active strategies.
    async fn get_active_strategies(&self) -> Result<Vec<ActiveStrategy>, StateStoreError>;

    /// Deactivate the active strategy for a pair. Returns whether one existed.
    async fn deactivate_strategy(&self, symbol: &Symbol, side: Side)
    -> Result<bool, StateStoreError>;

    /// Save a trailing stop, updating the active row for the pair in place.
    async fn save_trailing_stop(&self, stop: &TrailingStop) -> Result<(), StateStoreError>;

    /// All active trailing stops.
    async fn get_trailing_stops(&self) -> Result<Vec<TrailingStop>, StateStoreError>;

    /// Deactivate the trailing stop for a pair. Returns whether one existed.
    async fn remove_trailing_stop(&self, symbol: &Symbol, side: Side)
    -> Result<bool, StateStoreError>;

    /// Deactivate every strategy and stop whose pair is not in `real_positions`.
    ///
    /// An empty `real_positions` deactivates everything.
    async fn cleanup_closed_positions(
        &self,
        real_positions: &[ExchangePosition],
    ) -> Result<CleanupReport, StateStoreError>;

    /// Replace the recovery snapshot.
    async fn save_recovery_snapshot(
        &self,
        snapshot: &RecoverySnapshot,
    ) -> Result<(), StateStoreError>;

    /// The current recovery snapshot, if one was ever saved.
    async fn get_recovery_snapshot(&self) -> Result<Option<RecoverySnapshot>, StateStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn cleanup_report_totals() {
        let key = PairKey::new(Symbol::new("BTCUSDT"), Side::Buy);
        let report = CleanupReport {
            strategies_deactivated: vec![key.clone()],
            stops_deactivated: vec![key],
        };
        assert_eq!(report.total(), 2);
        assert!(!report.is_empty());
        assert!(CleanupReport::default().is_empty());
    }

    #[test]
    fn open_pairs_from_positions() {
        let positions = vec![ExchangePosition {
            symbol: Symbol::new("BTCUSDT"),
            side: Side::Buy,
            size: dec!(0.01),
            avg_price: dec!(50000),
            mark_price: dec!(50100),
            unrealized_pnl: dec!(1),
        }];
        let pairs = open_pairs(&positions);
        assert!(pairs.contains(&PairKey::new(Symbol::new("BTCUSDT"), Side::Buy)));
        assert!(!pairs.contains(&PairKey::new(Symbol::new("BTCUSDT"), Side::Sell)));
    }
}
