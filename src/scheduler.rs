//! The ingestion loop.
//!
//! One cycle: fetch the feed, run every candidate through the pipeline in
//! feed order, optionally refresh the JSON snapshot. Cycles are one interval
//! apart; a failed feed fetch also waits one interval before trying again.
//!
//! Shutdown is a `watch` flag. It is checked between candidates and raced
//! against the inter-cycle sleep, so an in-flight candidate always finishes.

use crate::clock::Clock;
use crate::error::FeedFetchError;
use crate::outputs::json::snapshot_store;
use crate::pipeline::{IngestionPipeline, ProcessOutcome};
use crate::scrapers::feed::FeedSource;
use crate::store::ArticleStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub persisted: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Shutdown was requested before every candidate was processed.
    pub interrupted: bool,
}

struct SnapshotTarget {
    store: Arc<dyn ArticleStore>,
    dir: PathBuf,
    limit: usize,
}

pub struct Scheduler {
    feed: Arc<dyn FeedSource>,
    pipeline: IngestionPipeline,
    clock: Arc<dyn Clock>,
    interval: Duration,
    snapshot: Option<SnapshotTarget>,
}

impl Scheduler {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        pipeline: IngestionPipeline,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            feed,
            pipeline,
            clock,
            interval,
            snapshot: None,
        }
    }

    /// Rewrite `{dir}/latest.json` with the newest `limit` records after each
    /// successful cycle.
    pub fn with_snapshot(mut self, store: Arc<dyn ArticleStore>, dir: PathBuf, limit: usize) -> Self {
        self.snapshot = Some(SnapshotTarget { store, dir, limit });
        self
    }

    #[instrument(level = "info", skip_all)]
    pub async fn run_cycle(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<CycleReport, FeedFetchError> {
        let candidates = self.feed.fetch().await?;
        let mut report = CycleReport {
            fetched: candidates.len(),
            ..CycleReport::default()
        };

        for candidate in &candidates {
            if *shutdown.borrow() {
                report.interrupted = true;
                break;
            }
            match self.pipeline.process(candidate).await {
                ProcessOutcome::Persisted => report.persisted += 1,
                ProcessOutcome::SkippedDuplicate => report.skipped += 1,
                ProcessOutcome::Failed(_) => report.failed += 1,
            }
        }

        if let Some(target) = &self.snapshot {
            if let Err(e) =
                snapshot_store(target.store.as_ref(), target.limit, self.clock.now(), &target.dir).await
            {
                error!(error = %e, "Failed to write JSON snapshot");
            }
        }

        info!(
            fetched = report.fetched,
            persisted = report.persisted,
            skipped = report.skipped,
            failed = report.failed,
            interrupted = report.interrupted,
            "Cycle complete"
        );
        Ok(report)
    }

    /// Run cycles until `shutdown` turns true.
    #[instrument(level = "info", skip_all, fields(interval_secs = self.interval.as_secs()))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Scheduler started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.run_cycle(&shutdown).await {
                warn!(error = %e, "Feed fetch failed; retrying after one interval");
            }
            if *shutdown.borrow() {
                break;
            }
            if !self.wait_interval(&mut shutdown).await {
                break;
            }
        }
        info!("Scheduler stopped");
    }

    /// `false` when shutdown arrived during the wait.
    async fn wait_interval(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let sleep = self.clock.sleep(self.interval);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Nobody can signal shutdown any more.
                        sleep.await;
                        return true;
                    }
                    if *shutdown.borrow() {
                        return false;
                    }
                }
            }
        }
    }
}
