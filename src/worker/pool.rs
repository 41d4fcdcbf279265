// ABOUTME: Spawns N consumer workers sharing one cancellation token and one stats block
// ABOUTME: Shutdown cancels polling and waits for every worker to finish its in-flight message

use super::{Worker, WorkerContext, WorkerSettings, WorkerStats, WorkerStatsSnapshot};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// A set of running workers
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawn `count` workers (at least one) on the current runtime
    #[must_use]
    pub fn spawn(
        count: usize,
        context: &WorkerContext,
        settings: WorkerSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let stats = Arc::new(WorkerStats::default());
        let handles = (0..count.max(1))
            .map(|id| {
                let worker = Worker::new(id, context.clone(), settings, Arc::clone(&stats));
                let token = shutdown.clone();
                tokio::spawn(async move { worker.run(token).await })
            })
            .collect::<Vec<_>>();

        info!(worker_count = handles.len(), "Worker pool started");
        Self {
            handles,
            stats,
            shutdown,
        }
    }

    /// Request shutdown without waiting
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Wait for every worker to stop
    ///
    /// Returns the final counters.
    pub async fn join(self) -> WorkerStatsSnapshot {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }

        let stats = self.stats.snapshot();
        info!(
            received = stats.received,
            acked = stats.acked,
            retried = stats.retried,
            dead_lettered = stats.dead_lettered,
            "Worker pool stopped"
        );
        stats
    }
}
