//! Per-(symbol, side) async locks.
//!
//! Besides the pair locks there is an entry gate: every position entry holds
//! it shared from order placement until its stop is armed, and reconciliation
//! takes it exclusively while it compares exchange positions with stored
//! state. The gate's epoch counts entries, so a reconciler can tell whether a
//! position snapshot taken outside the gate is still current.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{
    Mutex as AsyncMutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock,
};

use crate::domain::shared::PairKey;

/// Serializes work on the same pair while letting different pairs proceed
/// concurrently. Shared by everything that mutates stop or strategy state.
#[derive(Debug, Default)]
pub struct PairLocks {
    locks: Mutex<HashMap<PairKey, Arc<AsyncMutex<()>>>>,
    entries: Arc<RwLock<()>>,
    entry_epoch: AtomicU64,
}

/// Held by a position entry: the shared entry gate plus the pair lock.
#[derive(Debug)]
pub struct EntryGuard {
    _pair: OwnedMutexGuard<()>,
    _gate: OwnedRwLockReadGuard<()>,
}

/// Exclusive hold on the entry gate. No entry is in flight while it lives.
#[derive(Debug)]
pub struct EntryPause {
    _gate: OwnedRwLockWriteGuard<()>,
    epoch: u64,
}

impl EntryPause {
    /// Number of entries started before the pause was taken.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl PairLocks {
    /// Create an empty lock set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a pair, waiting for any current holder.
    pub async fn lock(&self, key: &PairKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Lock a pair for a position entry.
    ///
    /// Waits out any reconciliation pass in progress and bumps the entry epoch
    /// before returning.
    pub async fn lock_entry(&self, key: &PairKey) -> EntryGuard {
        let gate = Arc::clone(&self.entries).read_owned().await;
        self.entry_epoch.fetch_add(1, Ordering::AcqRel);
        let pair = self.lock(key).await;
        EntryGuard {
            _pair: pair,
            _gate: gate,
        }
    }

    /// Wait for in-flight entries to finish and hold new ones off.
    pub async fn pause_entries(&self) -> EntryPause {
        let gate = Arc::clone(&self.entries).write_owned().await;
        EntryPause {
            _gate: gate,
            epoch: self.entry_epoch.load(Ordering::Acquire),
        }
    }
}
