//! Bot Lifecycle Use Case
//!
//! Persists bot start/stop transitions so that recovery can tell a crash
//! from an operator stop.

use std::sync::Arc;

use crate::application::ports::{StateStoreError, StateStorePort};
use crate::domain::recovery::{BotConfig, RecoverySnapshot};

/// Records bot lifecycle transitions in the recovery snapshot.
pub struct BotLifecycleService {
    store: Arc<dyn StateStorePort>,
}

impl std::fmt::Debug for BotLifecycleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotLifecycleService").finish_non_exhaustive()
    }
}

impl BotLifecycleService {
    /// Create a new `BotLifecycleService`.
    #[must_use]
    pub fn new(store: Arc<dyn StateStorePort>) -> Self {
        Self { store }
    }

    /// The bot started with `config`. `manual` is false for automatic
    /// restarts, which keeps the throttle state.
    ///
    /// # Errors
    ///
    /// Returns a store error if the snapshot cannot be read or written.
    pub async fn record_started(
        &self,
        config: BotConfig,
        manual: bool,
    ) -> Result<RecoverySnapshot, StateStoreError> {
        let symbol = config.symbol.clone();
        let snapshot = self.current().await?.started(config, manual);
        self.store.save_recovery_snapshot(&snapshot).await?;
        tracing::info!(symbol = %symbol, manual, "Bot start recorded");
        Ok(snapshot)
    }

    /// The operator stopped the bot. No automatic restart follows.
    ///
    /// # Errors
    ///
    /// Returns a store error if the snapshot cannot be read or written.
    pub async fn stop_bot(&self) -> Result<RecoverySnapshot, StateStoreError> {
        let snapshot = self.current().await?.stopped_manually();
        self.store.save_recovery_snapshot(&snapshot).await?;
        tracing::info!("Bot stop recorded");
        Ok(snapshot)
    }

    /// Current snapshot, or the default if none was saved.
    ///
    /// # Errors
    ///
    /// Returns a store error if the snapshot cannot be read.
    pub async fn current(&self) -> Result<RecoverySnapshot, StateStoreError> {
        Ok(self
            .store
            .get_recovery_snapshot()
            .await?
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recovery::RestartPolicy;
    use crate::domain::shared::{Side, Symbol};
    use crate::infrastructure::persistence::InMemoryStateStore;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn config() -> BotConfig {
        BotConfig {
            symbol: Symbol::new("BTCUSDT"),
            quantity: dec!(0.01),
            side: Side::Buy,
            indicator_params: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn start_then_stop_disables_restart() {
        let service = BotLifecycleService::new(Arc::new(InMemoryStateStore::new()));
        let policy = RestartPolicy::default();

        let started = service.record_started(config(), true).await.unwrap();
        assert!(started.was_running);
        assert!(policy.should_restart(&started, Utc::now()));

        let stopped = service.stop_bot().await.unwrap();
        assert!(stopped.stopped_manually);
        assert!(!stopped.was_running);
        assert_eq!(stopped.bot_config, Some(config()));
        assert!(!policy.should_restart(&stopped, Utc::now()));
        assert_eq!(service.current().await.unwrap(), stopped);
    }

    #[tokio::test]
    async fn automatic_start_keeps_throttle() {
        let store = Arc::new(InMemoryStateStore::new());
        let now = Utc::now();
        store
            .save_recovery_snapshot(
                &RecoverySnapshot::default()
                    .started(config(), true)
                    .restart_attempted(now),
            )
            .await
            .unwrap();
        let service = BotLifecycleService::new(store);

        let snapshot = service.record_started(config(), false).await.unwrap();

        assert!(snapshot.auto_restart_attempted);
        assert!(!RestartPolicy::default().should_restart(&snapshot, now));
    }
}
