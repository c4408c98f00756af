//! One run over the feed: filter, then acquire → post → write back each
//! accepted row strictly in order, under an outer wall-clock deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ErrorKind, PipelineError};
use crate::models::diagnostics::RunReport;
use crate::models::outcome::RowOutcome;
use crate::models::row::{Feed, Row};
use crate::services::acquisition::{AcquiredVideo, VideoAcquirer, VideoSource};
use crate::services::clock::Clock;
use crate::services::posting::PostingOrchestrator;
use crate::services::row_filter::{filter_rows, FilterConfig};
use crate::services::writeback::{FeedSource, WritebackAdapter};

/// Failures that stop the whole run before any row is touched.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Feed could not be read: {0}")]
    Feed(PipelineError),

    #[error("No platform is enabled; set credentials for at least one of FACEBOOK, INSTAGRAM, X, LINKEDIN or enable DRY_RUN")]
    NoPlatforms,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub caption_columns: Vec<String>,
    pub title_columns: Vec<String>,
    pub details_columns: Vec<String>,
    pub run_timeout: Duration,
    /// Time kept back at the end of the run for posting and writeback.
    pub posting_reserve: Duration,
    pub dry_run: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            caption_columns: vec!["Caption".to_string()],
            title_columns: vec!["Title".to_string()],
            details_columns: vec!["Details".to_string()],
            run_timeout: Duration::from_secs(3_300),
            posting_reserve: Duration::from_secs(120),
            dry_run: false,
        }
    }
}

pub struct Pipeline {
    filter: FilterConfig,
    acquirer: VideoAcquirer,
    posting: PostingOrchestrator,
    writeback: WritebackAdapter,
    clock: Arc<dyn Clock>,
    settings: RunSettings,
}

impl Pipeline {
    pub fn new(
        filter: FilterConfig,
        acquirer: VideoAcquirer,
        posting: PostingOrchestrator,
        writeback: WritebackAdapter,
        clock: Arc<dyn Clock>,
        settings: RunSettings,
    ) -> Self {
        Self {
            filter,
            acquirer,
            posting,
            writeback,
            clock,
            settings,
        }
    }

    /// Fetch the feed and process it.
    pub async fn run(&self, source: &dyn FeedSource) -> Result<RunReport, RunError> {
        if self.posting.is_empty() && !self.settings.dry_run {
            return Err(RunError::NoPlatforms);
        }
        let feed = source.fetch_rows().await.map_err(RunError::Feed)?;
        Ok(self.process_feed(&feed).await)
    }

    /// Process an already-fetched snapshot.
    pub async fn process_feed(&self, feed: &Feed) -> RunReport {
        let run_id = Uuid::new_v4();
        let started = self.clock.now();
        let deadline = started.checked_add(self.settings.run_timeout);
        if deadline.is_none() {
            warn!(run_id = %run_id, "Run timeout too large to represent, running without a deadline");
        }

        info!(
            run_id = %run_id,
            rows = feed.rows.len(),
            platforms = ?self.posting.platforms(),
            dry_run = self.settings.dry_run,
            "Run started"
        );

        let filtered = filter_rows(feed, &self.filter);
        let accepted: Vec<(usize, String)> = filtered
            .accepted()
            .map(|(index, job_id)| (index, job_id.to_string()))
            .collect();
        let mut report = RunReport::new(
            run_id,
            self.clock.utc_now(),
            self.settings.dry_run,
            filtered.diagnostics,
        );

        for (position, (row_index, job_id)) in accepted.iter().enumerate() {
            if deadline.is_some_and(|d| self.clock.now() + self.settings.posting_reserve >= d) {
                report.unprocessed_rows = accepted.len() - position;
                warn!(
                    run_id = %run_id,
                    remaining = report.unprocessed_rows,
                    "Run deadline reached, leaving remaining rows for the next run"
                );
                break;
            }
            let Some(row) = feed.rows.get(*row_index) else {
                continue;
            };

            let outcome = self.process_row(job_id, row, deadline).await;
            self.record(&mut report, &outcome);

            if self.settings.dry_run {
                continue;
            }
            if self.writeback.write(&outcome, self.clock.utc_now()).await.is_err() {
                report.writeback_failures += 1;
            }
        }

        report.finished_at = Some(self.clock.utc_now());
        info!(
            run_id = %run_id,
            total = report.total_rows,
            skipped = report.skipped_rows,
            processed = report.processed_rows,
            posted = report.posted_rows,
            failed = report.failed_rows,
            platform_failures = report.platform_failure_total(),
            writeback_failures = report.writeback_failures,
            unprocessed = report.unprocessed_rows,
            "Run finished"
        );
        report
    }

    /// Acquisition must finish `posting_reserve` before `deadline`; posting
    /// may use that reserve but never runs past `deadline` itself.
    async fn process_row(&self, job_id: &str, row: &Row, deadline: Option<Instant>) -> RowOutcome {
        metrics::counter!("reels_rows_total").increment(1);
        info!(job_id, row = row.line_number(), "Processing row");

        let acquisition_deadline = deadline.and_then(|d| d.checked_sub(self.settings.posting_reserve));
        let video = match self.acquirer.acquire(job_id, row, acquisition_deadline).await {
            Ok(video) => video,
            Err(failure) => {
                warn!(
                    job_id,
                    row = row.line_number(),
                    error_kind = %failure.kind(),
                    error = %failure.error,
                    "Video acquisition failed, row will not be posted"
                );
                return RowOutcome {
                    row_index: row.index,
                    job_id: job_id.to_string(),
                    posted: false,
                    video_url: None,
                    video_status: failure.status().to_string(),
                    mapping: failure.job.as_ref().map(|j| j.mapping.clone()),
                    post_results: Vec::new(),
                    last_error: Some(failure.error.to_string()),
                    acquisition_error: Some(failure.kind()),
                };
            }
        };

        let caption = self.caption_for(row);
        let post = self.posting.post_row(job_id, &video.url, &caption, deadline).await;
        let last_error = post
            .failures()
            .map(|r| r.summary())
            .collect::<Vec<_>>()
            .join("; ");

        RowOutcome {
            row_index: row.index,
            job_id: job_id.to_string(),
            posted: post.posted,
            video_status: video_status(&video).to_string(),
            mapping: video.mapping().cloned(),
            video_url: Some(video.url),
            post_results: post.results,
            last_error: (!last_error.is_empty()).then_some(last_error),
            acquisition_error: None,
        }
    }

    /// Caption column when filled, otherwise title and details.
    fn caption_for(&self, row: &Row) -> String {
        if let Some((_, caption)) = row.first_non_empty(&self.settings.caption_columns) {
            return caption.to_string();
        }
        let title = row.first_non_empty(&self.settings.title_columns).map(|(_, v)| v);
        let details = row.first_non_empty(&self.settings.details_columns).map(|(_, v)| v);
        match (title, details) {
            (Some(t), Some(d)) => format!("{}\n\n{}", t, d),
            (Some(t), None) => t.to_string(),
            (None, Some(d)) => d.to_string(),
            (None, None) => String::new(),
        }
    }

    fn record(&self, report: &mut RunReport, outcome: &RowOutcome) {
        report.processed_rows += 1;
        if outcome.posted {
            report.posted_rows += 1;
        }

        if let Some(kind) = outcome.acquisition_error {
            report.failed_rows += 1;
            if kind == ErrorKind::Timeout {
                report.acquisition_timeouts += 1;
            }
            *report.acquisition_failures.entry(kind).or_default() += 1;
            return;
        }

        for failure in outcome.post_results.iter().filter(|r| r.is_failure()) {
            *report.platform_failures.entry(failure.platform).or_default() += 1;
        }
        let any_result = !outcome.post_results.is_empty();
        if any_result && !outcome.posted && !self.settings.dry_run {
            report.failed_rows += 1;
        }
    }
}

fn video_status(video: &AcquiredVideo) -> &'static str {
    match video.source {
        VideoSource::Provided => "provided",
        VideoSource::Reused => "reused",
        VideoSource::Generated => "ready",
    }
}
