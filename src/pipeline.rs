//! One candidate in, at most one record out.
//!
//! `dedup -> scrape -> rate-limit pause -> summarize -> upsert`. Any failure
//! ends the candidate with [`ProcessOutcome::Failed`] and nothing written, so
//! the same URL is simply tried again next cycle.

use crate::clock::Clock;
use crate::dedup::Deduplicator;
use crate::error::FailureReason;
use crate::models::{ArticleCandidate, ScrapeOutcome, SummaryRecord};
use crate::scrapers::article::Scrape;
use crate::store::ArticleStore;
use crate::summarizer::Summarize;
use crate::utils::truncate_for_log;
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug)]
pub enum ProcessOutcome {
    Persisted,
    SkippedDuplicate,
    Failed(FailureReason),
}

pub struct IngestionPipeline {
    dedup: Deduplicator,
    store: Arc<dyn ArticleStore>,
    scraper: Arc<dyn Scrape>,
    summarizer: Arc<dyn Summarize>,
    clock: Arc<dyn Clock>,
    rate_limit: Duration,
    last_created_at: Mutex<Option<DateTime<Utc>>>,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn ArticleStore>,
        scraper: Arc<dyn Scrape>,
        summarizer: Arc<dyn Summarize>,
        clock: Arc<dyn Clock>,
        rate_limit: Duration,
    ) -> Self {
        Self {
            dedup: Deduplicator::new(store.clone()),
            store,
            scraper,
            summarizer,
            clock,
            rate_limit,
            last_created_at: Mutex::new(None),
        }
    }

    /// Never returns an error; every failure is logged and reported as `Failed`.
    #[instrument(
        level = "info",
        skip_all,
        fields(
            url = %candidate.url,
            author = %candidate.author,
            published_at = %candidate.published_at
        )
    )]
    pub async fn process(&self, candidate: &ArticleCandidate) -> ProcessOutcome {
        debug!(
            teaser = %truncate_for_log(&candidate.raw_summary_html, 120),
            "Processing candidate"
        );
        match self.try_process(candidate).await {
            Ok(outcome) => outcome,
            Err(reason) => {
                warn!(error = %reason, "Candidate failed; will retry next cycle");
                ProcessOutcome::Failed(reason)
            }
        }
    }

    async fn try_process(
        &self,
        candidate: &ArticleCandidate,
    ) -> Result<ProcessOutcome, FailureReason> {
        if self
            .dedup
            .exists(&candidate.url)
            .await
            .map_err(FailureReason::Lookup)?
        {
            info!("Already summarised; skipping");
            return Ok(ProcessOutcome::SkippedDuplicate);
        }

        let content = match self.scraper.scrape(&candidate.url).await? {
            ScrapeOutcome::Found(content) => content,
            ScrapeOutcome::NoContent => return Err(FailureReason::NoContent),
        };

        self.clock.sleep(self.rate_limit).await;

        let summary = self.summarizer.summarize(&content.body_text).await?;

        let record = SummaryRecord {
            url: candidate.url.clone(),
            title: candidate.title.clone(),
            summary,
            image_url: content.image_url().map(str::to_string),
            created_at: self.next_created_at(),
        };
        self.store
            .upsert(&record)
            .await
            .map_err(FailureReason::Persist)?;

        info!(
            title = %record.title,
            has_image = record.image_url.is_some(),
            created_at = %record.created_at,
            "Persisted summary"
        );
        Ok(ProcessOutcome::Persisted)
    }

    /// Clock time at microsecond precision, bumped past the previous write if
    /// the clock has not moved.
    fn next_created_at(&self) -> DateTime<Utc> {
        let now = self.clock.now().trunc_subsecs(6);
        let mut last = self
            .last_created_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let next = match *last {
            Some(prev) if now <= prev => prev + chrono::Duration::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        next
    }
}
