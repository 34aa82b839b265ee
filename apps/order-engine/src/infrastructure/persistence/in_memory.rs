//! In-memory state store for testing and simulated runs.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{CleanupReport, StateStoreError, StateStorePort, open_pairs};
use crate::domain::recovery::{ActiveStrategy, ExchangePosition, RecoverySnapshot};
use crate::domain::shared::{Side, Symbol};
use crate::domain::stop_enforcement::TrailingStop;

#[derive(Debug, Clone)]
struct StopRow {
    stop: TrailingStop,
    is_active: bool,
}

#[derive(Debug, Default)]
struct Tables {
    strategies: Vec<ActiveStrategy>,
    stops: Vec<StopRow>,
    snapshot: Option<RecoverySnapshot>,
}

/// In-memory implementation of `StateStorePort`.
///
/// Keeps deactivated rows like the durable store does. Not for production use.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    tables: RwLock<Tables>,
}

impl InMemoryStateStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every strategy row, including deactivated ones.
    #[must_use]
    pub fn all_strategies(&self) -> Vec<ActiveStrategy> {
        self.tables.read().strategies.clone()
    }

    /// Number of trailing stop rows, including deactivated ones.
    #[must_use]
    pub fn trailing_stop_rows(&self) -> usize {
        self.tables.read().stops.len()
    }
}

#[async_trait]
impl StateStorePort for InMemoryStateStore {
    async fn save_active_strategy(
        &self,
        strategy: &ActiveStrategy,
    ) -> Result<(), StateStoreError> {
        let mut tables = self.tables.write();
        for row in &mut tables.strategies {
            if row.is_active && row.symbol == strategy.symbol && row.side == strategy.side {
                row.is_active = false;
            }
        }
        let mut row = strategy.clone();
        row.is_active = true;
        tables.strategies.push(row);
        Ok(())
    }

    async fn get_active_strategies(&self) -> Result<Vec<ActiveStrategy>, StateStoreError> {
        Ok(self
            .tables
            .read()
            .strategies
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn deactivate_strategy(
        &self,
        symbol: &Symbol,
        side: Side,
    ) -> Result<bool, StateStoreError> {
        let mut tables = self.tables.write();
        let mut found = false;
        for row in &mut tables.strategies {
            if row.is_active && &row.symbol == symbol && row.side == side {
                row.is_active = false;
                found = true;
            }
        }
        Ok(found)
    }

    async fn save_trailing_stop(&self, stop: &TrailingStop) -> Result<(), StateStoreError> {
        let mut tables = self.tables.write();
        if let Some(row) = tables
            .stops
            .iter_mut()
            .find(|r| r.is_active && r.stop.symbol == stop.symbol && r.stop.side == stop.side)
        {
            row.stop = stop.clone();
        } else {
            tables.stops.push(StopRow {
                stop: stop.clone(),
                is_active: true,
            });
        }
        Ok(())
    }

    async fn get_trailing_stops(&self) -> Result<Vec<TrailingStop>, StateStoreError> {
        Ok(self
            .tables
            .read()
            .stops
            .iter()
            .filter(|r| r.is_active)
            .map(|r| r.stop.clone())
            .collect())
    }

    async fn remove_trailing_stop(
        &self,
        symbol: &Symbol,
        side: Side,
    ) -> Result<bool, StateStoreError> {
        let mut tables = self.tables.write();
        let mut found = false;
        for row in &mut tables.stops {
            if row.is_active && &row.stop.symbol == symbol && row.stop.side == side {
                row.is_active = false;
                found = true;
            }
        }
        Ok(found)
    }

    async fn cleanup_closed_positions(
        &self,
        real_positions: &[ExchangePosition],
    ) -> Result<CleanupReport, StateStoreError> {
        let open = open_pairs(real_positions);
        let mut tables = self.tables.write();
        let mut report = CleanupReport::default();

        for row in &mut tables.strategies {
            if row.is_active && !open.contains(&row.key()) {
                row.is_active = false;
                report.strategies_deactivated.push(row.key());
            }
        }
        for row in &mut tables.stops {
            if row.is_active && !open.contains(&row.stop.key()) {
                row.is_active = false;
                report.stops_deactivated.push(row.stop.key());
            }
        }
        Ok(report)
    }

    async fn save_recovery_snapshot(
        &self,
        snapshot: &RecoverySnapshot,
    ) -> Result<(), StateStoreError> {
        self.tables.write().snapshot = Some(snapshot.clone());
        Ok(())
    }

    async fn get_recovery_snapshot(&self) -> Result<Option<RecoverySnapshot>, StateStoreError> {
        Ok(self.tables.read().snapshot.clone())
    }
}
