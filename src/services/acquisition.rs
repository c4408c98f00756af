//! Video acquisition for one accepted row.
//!
//! Order of preference:
//! 1. a direct video URL column on the row (always honoured),
//! 2. the URL written back by an earlier run (unless reprocessing is forced),
//! 3. a freshly generated video: script → avatar mapping → submit → poll.
//!
//! Any terminal non-ready outcome fails this row only.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, PipelineError};
use crate::models::row::Row;
use crate::models::video::{AvatarMapping, VideoJob, VideoJobState};
use crate::services::avatar_mapping::AvatarMapper;
use crate::services::clock::Clock;
use crate::services::retry::{retry_with_backoff, RetryPolicy};
use crate::services::script::{fallback_script, ScriptInput, ScriptProvider};
use crate::services::video::{PollStatus, UrlProbe, VideoProvider, VideoRequest};

#[derive(Debug, Clone)]
pub struct AcquisitionSettings {
    pub direct_url_columns: Vec<String>,
    /// Column where earlier runs stored the generated URL.
    pub mapped_url_column: String,
    pub title_columns: Vec<String>,
    pub details_columns: Vec<String>,
    pub force_reprocess: bool,
    pub probe_urls: bool,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub submit_policy: RetryPolicy,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            direct_url_columns: vec!["Direct Video URL".to_string()],
            mapped_url_column: "Video URL".to_string(),
            title_columns: vec!["Title".to_string()],
            details_columns: vec!["Details".to_string()],
            force_reprocess: false,
            probe_urls: true,
            poll_interval: Duration::from_secs(15),
            poll_timeout: Duration::from_secs(600),
            submit_policy: RetryPolicy::single_attempt(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoSource {
    /// Supplied on the row itself.
    Provided,
    /// Generated by an earlier run and written back.
    Reused,
    Generated,
}

#[derive(Debug, Clone)]
pub struct AcquiredVideo {
    pub url: String,
    pub source: VideoSource,
    /// Present only for generated videos.
    pub job: Option<VideoJob>,
}

impl AcquiredVideo {
    pub fn mapping(&self) -> Option<&AvatarMapping> {
        self.job.as_ref().map(|j| &j.mapping)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct AcquisitionFailure {
    pub error: PipelineError,
    /// The job as far as it got, when generation was attempted.
    pub job: Option<VideoJob>,
}

impl AcquisitionFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn is_timeout(&self) -> bool {
        self.job
            .as_ref()
            .map(|j| j.state == VideoJobState::TimedOut)
            .unwrap_or(false)
    }

    /// Value for the writeback status column.
    pub fn status(&self) -> &'static str {
        match &self.job {
            Some(job) if job.state == VideoJobState::TimedOut => "timed_out",
            _ if self.error.kind() == ErrorKind::NotConfigured => "not_configured",
            _ => "failed",
        }
    }
}

pub struct VideoAcquirer {
    script: Option<Arc<dyn ScriptProvider>>,
    video: Option<Arc<dyn VideoProvider>>,
    probe: Option<Arc<dyn UrlProbe>>,
    mapper: AvatarMapper,
    clock: Arc<dyn Clock>,
    settings: AcquisitionSettings,
}

impl VideoAcquirer {
    pub fn new(
        script: Option<Arc<dyn ScriptProvider>>,
        video: Option<Arc<dyn VideoProvider>>,
        probe: Option<Arc<dyn UrlProbe>>,
        mapper: AvatarMapper,
        clock: Arc<dyn Clock>,
        settings: AcquisitionSettings,
    ) -> Self {
        Self {
            script,
            video,
            probe,
            mapper,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &AcquisitionSettings {
        &self.settings
    }

    /// Produce a playable video URL for the row.
    ///
    /// `deadline` is the latest instant polling may run until; the effective
    /// polling budget is the smaller of it and the configured poll timeout.
    pub async fn acquire(
        &self,
        job_id: &str,
        row: &Row,
        deadline: Option<Instant>,
    ) -> Result<AcquiredVideo, AcquisitionFailure> {
        if let Some(existing) = self.existing_video(job_id, row).await {
            return Ok(existing);
        }

        let Some(video) = &self.video else {
            return Err(AcquisitionFailure {
                error: PipelineError::NotConfigured("Video generation provider".to_string()),
                job: None,
            });
        };

        let title = first_value(row, &self.settings.title_columns);
        let details = first_value(row, &self.settings.details_columns);
        let mapping = self.mapper.map(&title, &details);
        info!(
            job_id,
            avatar = %mapping.avatar_id,
            voice = %mapping.voice_id,
            duration_secs = mapping.duration_secs,
            reason = %mapping.reason,
            "Avatar mapping selected"
        );

        let input = ScriptInput {
            job_id: job_id.to_string(),
            title,
            details,
            target_duration_secs: mapping.duration_secs,
        };
        let script = self.resolve_script(&input).await;

        let mut job = VideoJob::draft(job_id, script, mapping);
        let started = self.clock.now();
        let result = self.generate(video.as_ref(), &mut job, deadline).await;

        match result {
            Ok(()) => {
                metrics::counter!("reels_videos_generated_total").increment(1);
                metrics::histogram!("reels_video_generation_seconds")
                    .record((self.clock.now() - started).as_secs_f64());
                let url = job.video_url.clone().unwrap_or_default();
                Ok(AcquiredVideo {
                    url,
                    source: VideoSource::Generated,
                    job: Some(job),
                })
            }
            Err(error) => {
                metrics::counter!("reels_video_failures_total", "kind" => error.kind().to_string())
                    .increment(1);
                Err(AcquisitionFailure {
                    error,
                    job: Some(job),
                })
            }
        }
    }

    /// Short-circuit: a usable URL already on the row.
    async fn existing_video(&self, job_id: &str, row: &Row) -> Option<AcquiredVideo> {
        let direct = row
            .first_non_empty(&self.settings.direct_url_columns)
            .map(|(col, url)| (col.to_string(), url.to_string(), VideoSource::Provided));
        let reused = if self.settings.force_reprocess {
            None
        } else {
            row.get(&self.settings.mapped_url_column)
                .filter(|url| !url.is_empty())
                .map(|url| {
                    (
                        self.settings.mapped_url_column.clone(),
                        url.to_string(),
                        VideoSource::Reused,
                    )
                })
        };

        for (column, url, source) in direct.into_iter().chain(reused) {
            if !looks_like_url(&url) {
                warn!(job_id, column = %column, url = %url, "Ignoring malformed video URL");
                continue;
            }
            if self.url_is_usable(job_id, &url).await {
                info!(job_id, column = %column, url = %url, "Using existing video, generation skipped");
                return Some(AcquiredVideo {
                    url,
                    source,
                    job: None,
                });
            }
        }
        None
    }

    async fn url_is_usable(&self, job_id: &str, url: &str) -> bool {
        let Some(probe) = self.probe.as_ref().filter(|_| self.settings.probe_urls) else {
            return true;
        };
        match probe.exists(url).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(job_id, url, "Existing video URL is not reachable");
                false
            }
            Err(e) => {
                warn!(job_id, url, error = %e, "Existing video URL probe failed");
                false
            }
        }
    }

    /// Provider script, or the row's own text when the provider is absent or fails.
    async fn resolve_script(&self, input: &ScriptInput) -> String {
        match &self.script {
            Some(provider) => match provider.generate_script(input).await {
                Ok(script) => script,
                Err(e) => {
                    warn!(job_id = %input.job_id, error = %e, "Script generation failed, using row text");
                    fallback_script(input)
                }
            },
            None => {
                debug!(job_id = %input.job_id, "No script provider configured, using row text");
                fallback_script(input)
            }
        }
    }

    /// Drive the job from `Drafting` to a terminal state.
    async fn generate(
        &self,
        video: &dyn VideoProvider,
        job: &mut VideoJob,
        deadline: Option<Instant>,
    ) -> Result<(), PipelineError> {
        let request = VideoRequest {
            script: job.script.clone(),
            avatar_id: job.mapping.avatar_id.clone(),
            voice_id: job.mapping.voice_id.clone(),
            duration_secs: job.mapping.duration_secs,
        };

        let submitted = retry_with_backoff(
            &self.settings.submit_policy,
            self.clock.as_ref(),
            "video_submit",
            |_| video.submit(&request),
        )
        .await;

        let provider_job_id = match submitted {
            Ok((id, _)) => id,
            Err(failure) => {
                job.mark_failed(failure.error.to_string());
                return Err(failure.error);
            }
        };
        job.mark_submitted(&provider_job_id);
        info!(job_id = %job.job_id, provider_job_id = %provider_job_id, "Video job submitted");

        self.poll_until_done(video, job, deadline).await
    }

    async fn poll_until_done(
        &self,
        video: &dyn VideoProvider,
        job: &mut VideoJob,
        deadline: Option<Instant>,
    ) -> Result<(), PipelineError> {
        let started = self.clock.now();
        let budget = match deadline {
            Some(deadline) => self
                .settings
                .poll_timeout
                .min(deadline.saturating_duration_since(started)),
            None => self.settings.poll_timeout,
        };
        let provider_job_id = job.provider_job_id.clone().unwrap_or_default();

        loop {
            job.record_poll();
            match video.poll(&provider_job_id).await {
                Ok(PollStatus::Ready(url)) if !url.trim().is_empty() => {
                    info!(job_id = %job.job_id, polls = job.polls, url = %url, "Video ready");
                    job.mark_ready(url.trim());
                    return Ok(());
                }
                Ok(PollStatus::Ready(_)) => {
                    let reason = "provider reported ready without a URL";
                    job.mark_failed(reason);
                    return Err(PipelineError::Validation(reason.to_string()));
                }
                Ok(PollStatus::Failed(reason)) => {
                    warn!(job_id = %job.job_id, reason = %reason, "Video generation failed");
                    job.mark_failed(&reason);
                    return Err(PipelineError::Validation(format!("Video generation failed: {}", reason)));
                }
                Ok(PollStatus::Pending) => {
                    debug!(job_id = %job.job_id, polls = job.polls, "Video still rendering");
                }
                Err(e) if e.is_retryable() => {
                    warn!(job_id = %job.job_id, error = %e, "Status check failed, will poll again");
                }
                Err(e) => {
                    job.mark_failed(e.to_string());
                    return Err(e);
                }
            }

            let elapsed = self.clock.now() - started;
            if elapsed + self.settings.poll_interval > budget {
                let reason = format!(
                    "video not ready after {}s (budget {}s, {} polls)",
                    elapsed.as_secs(),
                    budget.as_secs(),
                    job.polls
                );
                warn!(job_id = %job.job_id, reason = %reason, "Video polling timed out");
                job.mark_timed_out(&reason);
                return Err(PipelineError::Timeout(reason));
            }
            self.clock.sleep(self.settings.poll_interval).await;
        }
    }
}

fn first_value(row: &Row, columns: &[String]) -> String {
    row.first_non_empty(columns)
        .map(|(_, v)| v.to_string())
        .unwrap_or_default()
}

fn looks_like_url(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    (lower.starts_with("https://") || lower.starts_with("http://")) && !value.contains(char::is_whitespace)
}
