use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::app::queue::WorkerPool;
use crate::app::runner::{CheckOutcome, CheckReport, CheckRunner};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub changed: usize,
    pub unchanged: usize,
    pub blocked: usize,
    pub failed: usize,
}

impl BatchStats {
    pub fn from_reports(reports: &[CheckReport]) -> Self {
        let mut stats = Self::default();
        for report in reports {
            match &report.outcome {
                Ok(CheckOutcome::Changed { .. }) => stats.changed += 1,
                Ok(CheckOutcome::Unchanged) => stats.unchanged += 1,
                Ok(CheckOutcome::Blocked) => stats.blocked += 1,
                Ok(CheckOutcome::Failed { .. }) | Err(_) => stats.failed += 1,
            }
        }
        stats
    }
}

/// Runs batches with a fixed `interval` between the end of one batch and
/// the start of the next, until `shutdown` resolves. A batch already running
/// when `shutdown` resolves is finished first. Returns the number of batches
/// started.
pub async fn watch<S>(
    runner: Arc<CheckRunner>,
    pool: WorkerPool,
    jitter_ms_max: u64,
    interval: Duration,
    shutdown: S,
) -> usize
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut batches = 0usize;

    loop {
        batches += 1;
        let batch = runner.check_all(&pool, jitter_ms_max);
        tokio::pin!(batch);
        let (result, stopping) = tokio::select! {
            result = &mut batch => (result, false),
            () = &mut shutdown => {
                tracing::info!(batch = batches, "shutdown requested, finishing batch");
                (batch.await, true)
            }
        };

        match result {
            Ok(reports) => {
                let stats = BatchStats::from_reports(&reports);
                tracing::info!(
                    batch = batches,
                    changed = stats.changed,
                    unchanged = stats.unchanged,
                    blocked = stats.blocked,
                    failed = stats.failed,
                    "batch finished"
                );
            }
            Err(err) => tracing::error!(batch = batches, ?err, "batch failed"),
        }
        if stopping {
            break;
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = &mut shutdown => break,
        }
    }

    tracing::info!(batches, "watch loop stopped");
    batches
}
