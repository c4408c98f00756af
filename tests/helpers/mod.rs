//! In-memory collaborators for driving the pipeline without any network.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use product_reels::error::PipelineError;
use product_reels::models::post::{Platform, PostMode, PostedPolicy};
use product_reels::models::row::Feed;
use product_reels::services::{
    acquisition::{AcquisitionSettings, VideoAcquirer},
    avatar_mapping::{AvatarMapper, CategoryRuleSpec, DefaultMapping},
    clock::ManualClock,
    pipeline::{Pipeline, RunSettings},
    platforms::PlatformPoster,
    posting::{PostingOrchestrator, PostingSettings},
    rate_limit::{RateLimitConfig, RateLimiter},
    retry::RetryPolicy,
    row_filter::FilterConfig,
    video::{PollStatus, VideoProvider, VideoRequest},
    writeback::{CellUpdate, FeedSink, FeedSource, WritebackAdapter, WritebackColumns},
};

// ── Feed ─────────────────────────────────────────────────────────────

/// Feed snapshot plus a log of every write made against it.
pub struct MemoryFeed {
    feed: Option<Feed>,
    fail_writes: bool,
    writes: Mutex<Vec<(usize, Vec<CellUpdate>)>>,
}

impl MemoryFeed {
    pub fn new(feed: Feed) -> Arc<Self> {
        Arc::new(Self {
            feed: Some(feed),
            fail_writes: false,
            writes: Mutex::new(Vec::new()),
        })
    }

    /// A feed whose fetch fails.
    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            feed: None,
            fail_writes: false,
            writes: Mutex::new(Vec::new()),
        })
    }

    /// A feed that reads fine but rejects every write.
    pub fn read_only(feed: Feed) -> Arc<Self> {
        Arc::new(Self {
            feed: Some(feed),
            fail_writes: true,
            writes: Mutex::new(Vec::new()),
        })
    }

    pub fn writes(&self) -> Vec<(usize, Vec<CellUpdate>)> {
        self.writes.lock().unwrap().clone()
    }

    /// Value written to `column` for data row `row_index`, if any.
    pub fn written(&self, row_index: usize, column: &str) -> Option<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(index, _)| *index == row_index)
            .flat_map(|(_, cells)| cells.iter())
            .filter(|c| c.column == column)
            .map(|c| c.value.clone())
            .last()
    }
}

#[async_trait]
impl FeedSource for MemoryFeed {
    async fn fetch_rows(&self) -> Result<Feed, PipelineError> {
        self.feed
            .clone()
            .ok_or_else(|| PipelineError::transient("HTTP 503: feed unavailable"))
    }
}

#[async_trait]
impl FeedSink for MemoryFeed {
    async fn set_cells(&self, row_index: usize, cells: &[CellUpdate]) -> Result<(), PipelineError> {
        if self.fail_writes {
            return Err(PipelineError::Auth("HTTP 403: read-only".into()));
        }
        self.writes.lock().unwrap().push((row_index, cells.to_vec()));
        Ok(())
    }
}

// ── Video provider ───────────────────────────────────────────────────

pub struct ScriptedVideoProvider {
    submit: Mutex<VecDeque<Result<String, PipelineError>>>,
    polls: Mutex<VecDeque<Result<PollStatus, PipelineError>>>,
    pub requests: Mutex<Vec<VideoRequest>>,
}

impl ScriptedVideoProvider {
    /// Every submission accepted; polls answered from `polls`, then `Pending` forever.
    pub fn with_polls(polls: Vec<Result<PollStatus, PipelineError>>) -> Arc<Self> {
        Arc::new(Self {
            submit: Mutex::new(VecDeque::new()),
            polls: Mutex::new(polls.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn ready_after(pending: usize, url: &str) -> Arc<Self> {
        let mut polls: Vec<_> = (0..pending).map(|_| Ok(PollStatus::Pending)).collect();
        polls.push(Ok(PollStatus::Ready(url.to_string())));
        Self::with_polls(polls)
    }

    pub fn submissions(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl VideoProvider for ScriptedVideoProvider {
    async fn submit(&self, request: &VideoRequest) -> Result<String, PipelineError> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        self.submit
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("provider-job-{}", n)))
    }

    async fn poll(&self, _provider_job_id: &str) -> Result<PollStatus, PipelineError> {
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(PollStatus::Pending))
    }
}

// ── Platforms ────────────────────────────────────────────────────────

pub struct ScriptedPoster {
    platform: Platform,
    respond: fn(u32) -> Result<String, PipelineError>,
    calls: AtomicU32,
    pub posted: Mutex<Vec<(String, String)>>,
}

impl ScriptedPoster {
    pub fn new(platform: Platform, respond: fn(u32) -> Result<String, PipelineError>) -> Arc<Self> {
        Arc::new(Self {
            platform,
            respond,
            calls: AtomicU32::new(0),
            posted: Mutex::new(Vec::new()),
        })
    }

    pub fn succeeding(platform: Platform) -> Arc<Self> {
        Self::new(platform, |n| Ok(format!("post-{}", n)))
    }

    pub fn always_transient(platform: Platform) -> Arc<Self> {
        Self::new(platform, |_| Err(PipelineError::transient("HTTP 503: unavailable")))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformPoster for ScriptedPoster {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn mode(&self) -> PostMode {
        PostMode::Native
    }

    async fn post(&self, video_url: &str, caption: &str) -> Result<String, PipelineError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.posted
            .lock()
            .unwrap()
            .push((video_url.to_string(), caption.to_string()));
        (self.respond)(n)
    }
}

// ── Pipeline assembly ────────────────────────────────────────────────

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub feed: Arc<MemoryFeed>,
    pub pipeline: Pipeline,
}

pub struct HarnessOptions {
    pub video: Option<Arc<dyn VideoProvider>>,
    pub posters: Vec<Arc<dyn PlatformPoster>>,
    pub rules: Vec<CategoryRuleSpec>,
    pub force_reprocess: bool,
    pub dry_run: bool,
    pub policy: PostedPolicy,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub run_timeout: Duration,
    pub posting_reserve: Duration,
    pub platform_retry: RetryPolicy,
    pub platform_window: Duration,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            video: None,
            posters: Vec::new(),
            rules: Vec::new(),
            force_reprocess: false,
            dry_run: false,
            policy: PostedPolicy::Any,
            poll_interval: Duration::from_secs(10),
            poll_timeout: Duration::from_secs(100),
            run_timeout: Duration::from_secs(3_300),
            posting_reserve: Duration::from_secs(120),
            platform_retry: RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(10)),
            platform_window: Duration::from_secs(300),
        }
    }
}

pub fn harness(feed: Arc<MemoryFeed>, options: HarnessOptions) -> Harness {
    let clock = Arc::new(ManualClock::new());

    let mapper = AvatarMapper::from_specs(
        options.rules,
        DefaultMapping {
            avatar_id: "default-avatar".into(),
            voice_id: "default-voice".into(),
            duration_secs: 30,
        },
    )
    .unwrap();

    let acquirer = VideoAcquirer::new(
        None,
        options.video,
        None,
        mapper,
        clock.clone(),
        AcquisitionSettings {
            direct_url_columns: vec!["Direct Video URL".into()],
            mapped_url_column: "Video URL".into(),
            title_columns: vec!["Title".into()],
            details_columns: vec!["Details".into()],
            force_reprocess: options.force_reprocess,
            probe_urls: false,
            poll_interval: options.poll_interval,
            poll_timeout: options.poll_timeout,
            submit_policy: RetryPolicy::single_attempt(),
        },
    );

    let posting = PostingOrchestrator::new(
        options.posters,
        RateLimiter::new(clock.clone(), RateLimitConfig::one_per(Duration::ZERO)),
        clock.clone(),
        PostingSettings {
            retry: options.platform_retry,
            window: options.platform_window,
            dry_run: options.dry_run,
            policy: options.policy,
        },
    );

    let pipeline = Pipeline::new(
        FilterConfig {
            job_id_columns: vec!["Job ID".into(), "SKU".into()],
            posted_column: "Posted".into(),
            ready_column: Some("Ready".into()),
            force_reprocess: options.force_reprocess,
            sample_limit: 5,
        },
        acquirer,
        posting,
        WritebackAdapter::new(feed.clone(), WritebackColumns::default()),
        clock.clone(),
        RunSettings {
            caption_columns: vec!["Caption".into()],
            title_columns: vec!["Title".into()],
            details_columns: vec!["Details".into()],
            run_timeout: options.run_timeout,
            posting_reserve: options.posting_reserve,
            dry_run: options.dry_run,
        },
    );

    Harness {
        clock,
        feed,
        pipeline,
    }
}
