//! Durable state store on SQLite.
//!
//! Three tables back the store:
//!
//! - `active_strategies`: one row per opened position strategy
//! - `trailing_stops`: one row per trailing stop, updated in place while active
//! - `bot_state`: typed JSON documents, currently only the recovery snapshot
//!
//! Rows are never deleted. A partial unique index on `(symbol, side) WHERE
//! is_active = 1` guarantees at most one live row per pair.

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use crate::application::ports::{CleanupReport, StateStoreError, StateStorePort, open_pairs};
use crate::domain::recovery::{
    ActiveStrategy, ExchangePosition, RecoverySnapshot, StrategyKind, StrategyParams,
};
use crate::domain::shared::{PairKey, Side, Symbol};
use crate::domain::stop_enforcement::TrailingStop;

const RECOVERY_SNAPSHOT: &str = "recovery_snapshot";

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS active_strategies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        side TEXT NOT NULL,
        entry_price TEXT NOT NULL,
        entry_time TEXT NOT NULL,
        strategy_type TEXT NOT NULL,
        strategy_params_json TEXT NOT NULL,
        position_size TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    ",
    r"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_active_strategies_live_pair
        ON active_strategies (symbol, side) WHERE is_active = 1
    ",
    r"
    CREATE TABLE IF NOT EXISTS trailing_stops (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        side TEXT NOT NULL,
        current_stop_price TEXT NOT NULL,
        trail_amount TEXT NOT NULL,
        best_price TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    ",
    r"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_trailing_stops_live_pair
        ON trailing_stops (symbol, side) WHERE is_active = 1
    ",
    r"
    CREATE TABLE IF NOT EXISTS bot_state (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        state_type TEXT NOT NULL,
        data_json TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        timestamp TEXT NOT NULL
    )
    ",
    r"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_bot_state_live_type
        ON bot_state (state_type) WHERE is_active = 1
    ",
];

impl From<sqlx::Error> for StateStoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Integrity(db.message().to_string())
            }
            sqlx::Error::Configuration(_)
            | sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => Self::Connection(err.to_string()),
            _ => Self::Query(err.to_string()),
        }
    }
}

/// SQLite implementation of `StateStorePort`.
#[derive(Debug, Clone)]
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Open (creating if missing) the database at `database_url` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, StateStoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StateStoreError::Connection(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        info!(
            database_url = %database_url,
            max_connections = max_connections,
            "SQLite state store initialized"
        );
        Ok(store)
    }

    /// Open a private in-memory database.
    ///
    /// The pool holds exactly one connection that never expires, since each
    /// SQLite connection to `:memory:` sees its own database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub async fn in_memory() -> Result<Self, StateStoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StateStoreError::Connection(e.to_string()))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Start a write transaction. `BEGIN IMMEDIATE` takes the write lock up
    /// front, so a transaction that reads before it writes waits on the busy
    /// timeout instead of failing with `SQLITE_BUSY` when another connection
    /// committed in between.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, StateStoreError> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Close the pool, waiting for in-flight queries.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<(), StateStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("State store schema applied");
        Ok(())
    }

    fn row_to_strategy(row: &SqliteRow) -> Result<ActiveStrategy, StateStoreError> {
        let strategy_type: String = row.try_get("strategy_type")?;
        let kind = StrategyKind::from_str(&strategy_type)
            .map_err(|e| StateStoreError::Integrity(e.to_string()))?;
        let params_json: String = row.try_get("strategy_params_json")?;
        let params: StrategyParams = serde_json::from_str(&params_json)?;
        if params.kind() != kind {
            return Err(StateStoreError::Integrity(format!(
                "strategy_type {kind} does not match parameters of kind {}",
                params.kind()
            )));
        }

        Ok(ActiveStrategy {
            symbol: Symbol::new(row.try_get::<String, _>("symbol")?),
            side: parse_side(&row.try_get::<String, _>("side")?)?,
            entry_price: parse_decimal("entry_price", &row.try_get::<String, _>("entry_price")?)?,
            entry_time: parse_time("entry_time", &row.try_get::<String, _>("entry_time")?)?,
            params,
            position_size: parse_decimal(
                "position_size",
                &row.try_get::<String, _>("position_size")?,
            )?,
            is_active: row.try_get("is_active")?,
        })
    }

    fn row_to_trailing_stop(row: &SqliteRow) -> Result<TrailingStop, StateStoreError> {
        Ok(TrailingStop {
            symbol: Symbol::new(row.try_get::<String, _>("symbol")?),
            side: parse_side(&row.try_get::<String, _>("side")?)?,
            current_stop_price: parse_decimal(
                "current_stop_price",
                &row.try_get::<String, _>("current_stop_price")?,
            )?,
            trail_distance: parse_decimal(
                "trail_amount",
                &row.try_get::<String, _>("trail_amount")?,
            )?,
            best_price: parse_decimal("best_price", &row.try_get::<String, _>("best_price")?)?,
            updated_at: parse_time("updated_at", &row.try_get::<String, _>("updated_at")?)?,
        })
    }

    fn row_to_pair(row: &SqliteRow) -> Result<(i64, PairKey), StateStoreError> {
        let id: i64 = row.try_get("id")?;
        let symbol = Symbol::new(row.try_get::<String, _>("symbol")?);
        let side = parse_side(&row.try_get::<String, _>("side")?)?;
        Ok((id, PairKey::new(symbol, side)))
    }
}

#[async_trait]
impl StateStorePort for SqliteStateStore {
    async fn save_active_strategy(
        &self,
        strategy: &ActiveStrategy,
    ) -> Result<(), StateStoreError> {
        let now = Utc::now().to_rfc3339();
        let params_json = serde_json::to_string(&strategy.params)?;
        let mut tx = self.begin_write().await?;

        sqlx::query(
            r"
            UPDATE active_strategies SET is_active = 0, updated_at = ?
            WHERE symbol = ? AND side = ? AND is_active = 1
            ",
        )
        .bind(&now)
        .bind(strategy.symbol.as_str())
        .bind(strategy.side.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            INSERT INTO active_strategies (
                symbol, side, entry_price, entry_time, strategy_type,
                strategy_params_json, position_size, is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            ",
        )
        .bind(strategy.symbol.as_str())
        .bind(strategy.side.as_str())
        .bind(strategy.entry_price.to_string())
        .bind(strategy.entry_time.to_rfc3339())
        .bind(strategy.kind().as_str())
        .bind(&params_json)
        .bind(strategy.position_size.to_string())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(
            symbol = %strategy.symbol,
            side = %strategy.side,
            kind = %strategy.kind(),
            "Saved active strategy"
        );
        Ok(())
    }

    async fn get_active_strategies(&self) -> Result<Vec<ActiveStrategy>, StateStoreError> {
        let rows = sqlx::query(
            r"
            SELECT symbol, side, entry_price, entry_time, strategy_type,
                   strategy_params_json, position_size, is_active
            FROM active_strategies
            WHERE is_active = 1
            ORDER BY id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_strategy).collect()
    }

    async fn deactivate_strategy(
        &self,
        symbol: &Symbol,
        side: Side,
    ) -> Result<bool, StateStoreError> {
        let result = sqlx::query(
            r"
            UPDATE active_strategies SET is_active = 0, updated_at = ?
            WHERE symbol = ? AND side = ? AND is_active = 1
            ",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(symbol.as_str())
        .bind(side.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_trailing_stop(&self, stop: &TrailingStop) -> Result<(), StateStoreError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.begin_write().await?;

        let updated = sqlx::query(
            r"
            UPDATE trailing_stops
            SET current_stop_price = ?, trail_amount = ?, best_price = ?, updated_at = ?
            WHERE symbol = ? AND side = ? AND is_active = 1
            ",
        )
        .bind(stop.current_stop_price.to_string())
        .bind(stop.trail_distance.to_string())
        .bind(stop.best_price.to_string())
        .bind(stop.updated_at.to_rfc3339())
        .bind(stop.symbol.as_str())
        .bind(stop.side.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r"
                INSERT INTO trailing_stops (
                    symbol, side, current_stop_price, trail_amount, best_price,
                    is_active, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, 1, ?, ?)
                ",
            )
            .bind(stop.symbol.as_str())
            .bind(stop.side.as_str())
            .bind(stop.current_stop_price.to_string())
            .bind(stop.trail_distance.to_string())
            .bind(stop.best_price.to_string())
            .bind(&now)
            .bind(stop.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_trailing_stops(&self) -> Result<Vec<TrailingStop>, StateStoreError> {
        let rows = sqlx::query(
            r"
            SELECT symbol, side, current_stop_price, trail_amount, best_price, updated_at
            FROM trailing_stops
            WHERE is_active = 1
            ORDER BY id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_trailing_stop).collect()
    }

    async fn remove_trailing_stop(
        &self,
        symbol: &Symbol,
        side: Side,
    ) -> Result<bool, StateStoreError> {
        let result = sqlx::query(
            r"
            UPDATE trailing_stops SET is_active = 0, updated_at = ?
            WHERE symbol = ? AND side = ? AND is_active = 1
            ",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(symbol.as_str())
        .bind(side.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn cleanup_closed_positions(
        &self,
        real_positions: &[ExchangePosition],
    ) -> Result<CleanupReport, StateStoreError> {
        let open: HashSet<PairKey> = open_pairs(real_positions);
        let now = Utc::now().to_rfc3339();
        let mut report = CleanupReport::default();
        let mut tx = self.begin_write().await?;

        let strategy_rows =
            sqlx::query("SELECT id, symbol, side FROM active_strategies WHERE is_active = 1")
                .fetch_all(&mut *tx)
                .await?;
        for row in &strategy_rows {
            let (id, key) = Self::row_to_pair(row)?;
            if open.contains(&key) {
                continue;
            }
            sqlx::query("UPDATE active_strategies SET is_active = 0, updated_at = ? WHERE id = ?")
                .bind(&now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            report.strategies_deactivated.push(key);
        }

        let stop_rows =
            sqlx::query("SELECT id, symbol, side FROM trailing_stops WHERE is_active = 1")
                .fetch_all(&mut *tx)
                .await?;
        for row in &stop_rows {
            let (id, key) = Self::row_to_pair(row)?;
            if open.contains(&key) {
                continue;
            }
            sqlx::query("UPDATE trailing_stops SET is_active = 0, updated_at = ? WHERE id = ?")
                .bind(&now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            report.stops_deactivated.push(key);
        }

        tx.commit().await?;
        Ok(report)
    }

    async fn save_recovery_snapshot(
        &self,
        snapshot: &RecoverySnapshot,
    ) -> Result<(), StateStoreError> {
        let data_json = serde_json::to_string(snapshot)?;
        let mut tx = self.begin_write().await?;

        sqlx::query("UPDATE bot_state SET is_active = 0 WHERE state_type = ? AND is_active = 1")
            .bind(RECOVERY_SNAPSHOT)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO bot_state (state_type, data_json, is_active, timestamp) VALUES (?, ?, 1, ?)",
        )
        .bind(RECOVERY_SNAPSHOT)
        .bind(&data_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_recovery_snapshot(&self) -> Result<Option<RecoverySnapshot>, StateStoreError> {
        let row = sqlx::query(
            r"
            SELECT data_json FROM bot_state
            WHERE state_type = ? AND is_active = 1
            ORDER BY id DESC
            LIMIT 1
            ",
        )
        .bind(RECOVERY_SNAPSHOT)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<RecoverySnapshot, StateStoreError> {
            let data: String = row.try_get("data_json")?;
            Ok(serde_json::from_str(&data)?)
        })
        .transpose()
    }
}

// ============================================================================
// Column parsing
// ============================================================================

fn parse_side(value: &str) -> Result<Side, StateStoreError> {
    Side::from_str(value).map_err(|e| StateStoreError::Integrity(e.to_string()))
}

fn parse_decimal(column: &str, value: &str) -> Result<Decimal, StateStoreError> {
    Decimal::from_str(value)
        .map_err(|e| StateStoreError::Integrity(format!("{column} '{value}': {e}")))
}

fn parse_time(column: &str, value: &str) -> Result<DateTime<Utc>, StateStoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StateStoreError::Integrity(format!("{column} '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recovery::{BotConfig, TakeProfitParams};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn strategy(symbol: &str, side: Side) -> ActiveStrategy {
        ActiveStrategy::new(
            Symbol::new(symbol),
            side,
            dec!(50000),
            dec!(0.01),
            StrategyParams::trailing(dec!(0.02)),
        )
    }

    fn position(symbol: &str, side: Side) -> ExchangePosition {
        ExchangePosition {
            symbol: Symbol::new(symbol),
            side,
            size: dec!(0.01),
            avg_price: dec!(50000),
            mark_price: dec!(50100),
            unrealized_pnl: dec!(1),
        }
    }

    async fn count(store: &SqliteStateStore, table: &str) -> i64 {
        sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
            .fetch_one(&store.pool)
            .await
            .unwrap()
            .get("n")
    }

    #[tokio::test]
    async fn strategy_round_trip() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        let saved = ActiveStrategy::new(
            Symbol::new("BTCUSDT"),
            Side::Buy,
            dec!(50000.5),
            dec!(0.01),
            StrategyParams::TakeProfit(TakeProfitParams {
                target_price: dec!(52000),
            }),
        );
        store.save_active_strategy(&saved).await.unwrap();

        let loaded = store.get_active_strategies().await.unwrap();
        assert_eq!(loaded, vec![saved]);
    }

    #[tokio::test]
    async fn saving_same_pair_deactivates_previous_row() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        store
            .save_active_strategy(&strategy("BTCUSDT", Side::Buy))
            .await
            .unwrap();
        store
            .save_active_strategy(&strategy("BTCUSDT", Side::Buy))
            .await
            .unwrap();

        assert_eq!(store.get_active_strategies().await.unwrap().len(), 1);
        assert_eq!(count(&store, "active_strategies").await, 2);
    }

    #[tokio::test]
    async fn trailing_stop_updates_in_place() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        let mut stop =
            TrailingStop::new(Symbol::new("BTCUSDT"), Side::Buy, dec!(100), dec!(0.02)).unwrap();
        store.save_trailing_stop(&stop).await.unwrap();
        stop.on_price(dec!(110));
        store.save_trailing_stop(&stop).await.unwrap();

        let stops = store.get_trailing_stops().await.unwrap();
        assert_eq!(stops, vec![stop]);
        assert_eq!(count(&store, "trailing_stops").await, 1);
    }

    #[tokio::test]
    async fn removed_stop_is_kept_inactive() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        let stop =
            TrailingStop::new(Symbol::new("ETHUSDT"), Side::Sell, dec!(3000), dec!(0.01)).unwrap();
        store.save_trailing_stop(&stop).await.unwrap();

        assert!(store
            .remove_trailing_stop(&Symbol::new("ETHUSDT"), Side::Sell)
            .await
            .unwrap());
        assert!(!store
            .remove_trailing_stop(&Symbol::new("ETHUSDT"), Side::Sell)
            .await
            .unwrap());
        assert!(store.get_trailing_stops().await.unwrap().is_empty());
        assert_eq!(count(&store, "trailing_stops").await, 1);

        store.save_trailing_stop(&stop).await.unwrap();
        assert_eq!(store.get_trailing_stops().await.unwrap().len(), 1);
        assert_eq!(count(&store, "trailing_stops").await, 2);
    }

    #[tokio::test]
    async fn cleanup_deactivates_everything_without_positions() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        store
            .save_active_strategy(&strategy("BTCUSDT", Side::Buy))
            .await
            .unwrap();
        store
            .save_active_strategy(&strategy("ETHUSDT", Side::Sell))
            .await
            .unwrap();

        let report = store.cleanup_closed_positions(&[]).await.unwrap();

        assert_eq!(report.strategies_deactivated.len(), 2);
        assert!(store.get_active_strategies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cleanup_keeps_pairs_still_open() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        store
            .save_active_strategy(&strategy("BTCUSDT", Side::Buy))
            .await
            .unwrap();
        store
            .save_active_strategy(&strategy("ETHUSDT", Side::Sell))
            .await
            .unwrap();
        store
            .save_trailing_stop(
                &TrailingStop::new(Symbol::new("ETHUSDT"), Side::Sell, dec!(3000), dec!(0.02))
                    .unwrap(),
            )
            .await
            .unwrap();

        let report = store
            .cleanup_closed_positions(&[position("BTCUSDT", Side::Buy)])
            .await
            .unwrap();

        let eth = PairKey::new(Symbol::new("ETHUSDT"), Side::Sell);
        assert_eq!(report.strategies_deactivated, vec![eth.clone()]);
        assert_eq!(report.stops_deactivated, vec![eth]);
        let active = store.get_active_strategies().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].symbol.as_str(), "BTCUSDT");
    }

    #[tokio::test]
    async fn snapshot_replaces_previous() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        assert!(store.get_recovery_snapshot().await.unwrap().is_none());

        let config = BotConfig {
            symbol: Symbol::new("BTCUSDT"),
            quantity: dec!(0.01),
            side: Side::Buy,
            indicator_params: BTreeMap::from([("ema_fast".to_string(), serde_json::json!(9))]),
        };
        let running = RecoverySnapshot::default().started(config, true);
        store.save_recovery_snapshot(&running).await.unwrap();
        let stopped = running.stopped_manually();
        store.save_recovery_snapshot(&stopped).await.unwrap();

        assert_eq!(store.get_recovery_snapshot().await.unwrap(), Some(stopped));
        assert_eq!(count(&store, "bot_state").await, 2);
    }

    #[tokio::test]
    async fn mismatched_strategy_type_is_an_integrity_error() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        store
            .save_active_strategy(&strategy("BTCUSDT", Side::Buy))
            .await
            .unwrap();
        sqlx::query("UPDATE active_strategies SET strategy_type = 'stop_loss'")
            .execute(&store.pool)
            .await
            .unwrap();

        let err = store.get_active_strategies().await.unwrap_err();
        assert!(matches!(err, StateStoreError::Integrity(_)));
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("state.db").display());

        let store = SqliteStateStore::connect(&url, 2).await.unwrap();
        store
            .save_active_strategy(&strategy("BTCUSDT", Side::Buy))
            .await
            .unwrap();
        store.close().await;

        let reopened = SqliteStateStore::connect(&url, 2).await.unwrap();
        let active = reopened.get_active_strategies().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].symbol.as_str(), "BTCUSDT");
    }

    #[tokio::test]
    async fn concurrent_writers_share_a_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("state.db").display());
        let store = SqliteStateStore::connect(&url, 4).await.unwrap();
        let symbols = ["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT"];
        for symbol in symbols {
            store.save_active_strategy(&strategy(symbol, Side::Buy)).await.unwrap();
        }
        let open = vec![position("BTCUSDT", Side::Buy), position("ETHUSDT", Side::Buy)];

        let mut tasks = tokio::task::JoinSet::new();
        for round in 0..8 {
            let symbol = symbols[round % 2];
            let (cleaner, open) = (store.clone(), open.clone());
            tasks.spawn(async move { cleaner.cleanup_closed_positions(&open).await.map(|_| ()) });
            let writer = store.clone();
            tasks.spawn(async move { writer.save_active_strategy(&strategy(symbol, Side::Buy)).await });
            let writer = store.clone();
            tasks.spawn(async move {
                writer
                    .save_trailing_stop(
                        &TrailingStop::new(Symbol::new(symbol), Side::Buy, dec!(100), dec!(0.02))
                            .unwrap(),
                    )
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        let mut active: Vec<String> = store
            .get_active_strategies()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.symbol.as_str().to_string())
            .collect();
        active.sort();
        assert_eq!(active, ["BTCUSDT", "ETHUSDT"]);
        assert_eq!(store.get_trailing_stops().await.unwrap().len(), 2);
    }
}
