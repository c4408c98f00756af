//! Fan a ready video out to every enabled platform.
//!
//! Platforms run concurrently and independently: each gets its own retry
//! budget behind the shared per-platform rate limiter, and each is bounded by
//! a fixed window, measured on the injected clock and never past the run
//! deadline, so one slow platform cannot hold up the row.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{info, warn};

use crate::models::post::{Platform, PostOutcome, PostResult, PostedPolicy, RowPostReport};
use crate::services::clock::Clock;
use crate::services::platforms::PlatformPoster;
use crate::services::rate_limit::RateLimiter;
use crate::services::retry::{retry_within, RetryPolicy};

#[derive(Debug, Clone)]
pub struct PostingSettings {
    pub retry: RetryPolicy,
    /// Upper bound on one platform's attempts, backoff included.
    pub window: Duration,
    pub dry_run: bool,
    pub policy: PostedPolicy,
}

impl Default for PostingSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            window: Duration::from_secs(300),
            dry_run: false,
            policy: PostedPolicy::Any,
        }
    }
}

pub struct PostingOrchestrator {
    posters: Vec<Arc<dyn PlatformPoster>>,
    limiter: RateLimiter<Platform>,
    clock: Arc<dyn Clock>,
    settings: PostingSettings,
}

impl PostingOrchestrator {
    pub fn new(
        posters: Vec<Arc<dyn PlatformPoster>>,
        limiter: RateLimiter<Platform>,
        clock: Arc<dyn Clock>,
        settings: PostingSettings,
    ) -> Self {
        Self {
            posters,
            limiter,
            clock,
            settings,
        }
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.posters.iter().map(|p| p.platform()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.posters.is_empty()
    }

    /// Post to every platform and decide whether the row counts as posted.
    ///
    /// Each platform gets `window` from now, cut short by `run_deadline`.
    pub async fn post_row(
        &self,
        job_id: &str,
        video_url: &str,
        caption: &str,
        run_deadline: Option<Instant>,
    ) -> RowPostReport {
        let window_end = self.clock.now() + self.settings.window;
        let window_end = run_deadline.map_or(window_end, |d| d.min(window_end));

        let results = join_all(
            self.posters
                .iter()
                .map(|poster| self.post_one(job_id, poster.as_ref(), video_url, caption, window_end)),
        )
        .await;

        let posted = !self.settings.dry_run && self.settings.policy.is_posted(&results);
        info!(
            job_id,
            posted,
            succeeded = results.iter().filter(|r| r.is_success()).count(),
            failed = results.iter().filter(|r| r.is_failure()).count(),
            "Row posting finished"
        );
        RowPostReport { results, posted }
    }

    async fn post_one(
        &self,
        job_id: &str,
        poster: &dyn PlatformPoster,
        video_url: &str,
        caption: &str,
        window_end: Instant,
    ) -> PostResult {
        let platform = poster.platform();
        let mode = poster.mode();

        if self.settings.dry_run {
            info!(job_id, platform = %platform, mode = %mode, video_url, "Dry run, post suppressed");
            return PostResult {
                platform,
                mode,
                outcome: PostOutcome::DryRun,
                timestamp: self.clock.utc_now(),
            };
        }

        let limiter = &self.limiter;
        let result = retry_within(
            &self.settings.retry,
            self.clock.as_ref(),
            "platform_post",
            window_end,
            |attempt| async move {
                limiter.acquire(&platform).await;
                tracing::debug!(job_id, platform = %platform, attempt, "Posting");
                poster.post(video_url, caption).await
            },
        )
        .await;

        let outcome = match result {
            Ok((external_id, attempts)) => {
                info!(job_id, platform = %platform, external_id = %external_id, attempts, "Posted");
                PostOutcome::Success {
                    external_id,
                    attempts,
                }
            }
            Err(failure) => {
                warn!(
                    job_id,
                    platform = %platform,
                    attempts = failure.attempts,
                    error_kind = %failure.error.kind(),
                    error = %failure.error,
                    "Platform post failed"
                );
                PostOutcome::Failure {
                    error_kind: failure.error.kind(),
                    attempts: failure.attempts,
                    message: failure.error.to_string(),
                }
            }
        };

        let label = match &outcome {
            PostOutcome::Success { .. } => "success",
            PostOutcome::Failure { .. } => "failure",
            PostOutcome::DryRun => "dry_run",
        };
        metrics::counter!("reels_posts_total", "platform" => platform.to_string(), "outcome" => label)
            .increment(1);

        PostResult {
            platform,
            mode,
            outcome,
            timestamp: self.clock.utc_now(),
        }
    }
}
