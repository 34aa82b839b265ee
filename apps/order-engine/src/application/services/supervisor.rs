//! Structured task set for background workers.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Owns the cancellation token and task tracker shared by every worker, so
/// shutdown can cancel and join them deterministically.
#[derive(Debug, Clone, Default)]
pub struct Supervisor {
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl Supervisor {
    /// Create a supervisor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled on shutdown.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Tracker joined on shutdown.
    #[must_use]
    pub fn tracker(&self) -> TaskTracker {
        self.tasks.clone()
    }

    /// Spawn a named worker.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::debug!(worker = name, "Spawning worker");
        self.tasks.spawn(async move {
            future.await;
            tracing::debug!(worker = name, "Worker finished");
        });
    }

    /// Cancel every worker and wait up to `timeout` for them to finish.
    /// Returns `false` if the timeout elapsed first.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.shutdown.cancel();
        self.tasks.close();
        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok() {
            tracing::info!("All workers stopped");
            true
        } else {
            tracing::warn!(
                remaining = self.tasks.len(),
                timeout_secs = timeout.as_secs(),
                "Workers still running at shutdown timeout"
            );
            false
        }
    }
}
