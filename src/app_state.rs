use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::config::{AppConfig, ConfigError, PlatformSettings};
use crate::models::post::Platform;
use crate::services::{
    acquisition::{AcquisitionSettings, VideoAcquirer},
    avatar_mapping::{AvatarMapper, DefaultMapping},
    clock::Clock,
    pipeline::{Pipeline, RunSettings},
    platforms::build_posters,
    posting::{PostingOrchestrator, PostingSettings},
    rate_limit::{RateLimitConfig, RateLimiter},
    row_filter::FilterConfig,
    script::{ScriptProvider, WorkersAiScriptClient},
    sheets::GoogleSheetsClient,
    video::{HeyGenClient, HttpUrlProbe, UrlProbe, VideoProvider},
    writeback::{WritebackAdapter, WritebackColumns},
};

/// Everything one run needs, built once from configuration.
pub struct AppState {
    pub sheets: Arc<GoogleSheetsClient>,
    pub pipeline: Pipeline,
    pub platforms: PlatformSettings,
}

impl AppState {
    pub fn new(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {}", e)))?;

        let sheets = Arc::new(GoogleSheetsClient::new(
            http.clone(),
            &config.sheets_base_url,
            &config.feed_spreadsheet_id,
            &config.feed_sheet_name,
            &config.sheets_access_token,
        ));

        let platforms = PlatformSettings::resolve(config)?;
        let posting = PostingOrchestrator::new(
            build_posters(&platforms, &http, clock.clone(), config),
            RateLimiter::new(
                clock.clone(),
                RateLimitConfig::one_per(Duration::from_millis(config.platform_min_interval_ms)),
            ),
            clock.clone(),
            PostingSettings {
                retry: config.platform_retry_policy(),
                window: Duration::from_secs(config.platform_window_secs),
                dry_run: config.dry_run,
                policy: config.posted_policy()?,
            },
        );

        let acquirer = VideoAcquirer::new(
            script_provider(config, &http),
            video_provider(config, &http),
            Some(Arc::new(HttpUrlProbe::new(http.clone())) as Arc<dyn UrlProbe>),
            avatar_mapper(config)?,
            clock.clone(),
            AcquisitionSettings {
                direct_url_columns: config.direct_video_url_columns.clone(),
                mapped_url_column: WritebackColumns::default().video_url,
                title_columns: config.title_columns.clone(),
                details_columns: config.details_columns.clone(),
                force_reprocess: config.force_reprocess,
                probe_urls: !config.skip_url_probe,
                poll_interval: Duration::from_secs(config.poll_interval_secs),
                poll_timeout: Duration::from_secs(config.poll_timeout_secs),
                submit_policy: config.submit_retry_policy(),
            },
        );

        let filter = FilterConfig {
            job_id_columns: config.job_id_columns.clone(),
            posted_column: config.posted_column.clone(),
            ready_column: Some(config.ready_column.trim().to_string()).filter(|c| !c.is_empty()),
            force_reprocess: config.force_reprocess,
            sample_limit: config.diagnostic_sample_limit,
        };

        let pipeline = Pipeline::new(
            filter,
            acquirer,
            posting,
            WritebackAdapter::new(
                sheets.clone(),
                WritebackColumns::with_posted_column(&config.posted_column),
            ),
            clock,
            RunSettings {
                caption_columns: config.caption_columns.clone(),
                title_columns: config.title_columns.clone(),
                details_columns: config.details_columns.clone(),
                run_timeout: Duration::from_secs(config.run_timeout_secs),
                posting_reserve: Duration::from_secs(config.posting_reserve_secs),
                dry_run: config.dry_run,
            },
        );

        Ok(Self {
            sheets,
            pipeline,
            platforms,
        })
    }

    pub fn enabled_platforms(&self) -> Vec<Platform> {
        self.platforms.enabled.iter().map(|c| c.platform()).collect()
    }
}

fn script_provider(config: &AppConfig, http: &Client) -> Option<Arc<dyn ScriptProvider>> {
    match (config.cf_account_id.as_deref(), config.cf_api_token.as_deref()) {
        (Some(account), Some(token)) if !account.trim().is_empty() && !token.trim().is_empty() => {
            Some(Arc::new(WorkersAiScriptClient::new(
                http.clone(),
                &config.workers_ai_base_url,
                account.trim(),
                token.trim(),
            )))
        }
        _ => {
            tracing::info!("Workers AI not configured, scripts will come from row text");
            None
        }
    }
}

fn video_provider(config: &AppConfig, http: &Client) -> Option<Arc<dyn VideoProvider>> {
    match config.heygen_api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => Some(Arc::new(HeyGenClient::new(
            http.clone(),
            &config.heygen_base_url,
            key,
        ))),
        _ => {
            tracing::warn!("HEYGEN_API_KEY not set, only rows with an existing video URL can be posted");
            None
        }
    }
}

fn avatar_mapper(config: &AppConfig) -> Result<AvatarMapper, ConfigError> {
    let default = DefaultMapping {
        avatar_id: config.default_avatar_id.clone(),
        voice_id: config.default_voice_id.clone(),
        duration_secs: config.default_duration_secs,
    };
    let mapper = match config.avatar_rules_path.as_deref().map(str::trim) {
        Some(path) if !path.is_empty() => AvatarMapper::from_file(Path::new(path), default)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?,
        _ => AvatarMapper::new(Vec::new(), default),
    };
    tracing::info!(rules = mapper.rule_count(), "Avatar mapping loaded");
    Ok(mapper)
}
