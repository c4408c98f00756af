use garde::Validate;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::models::post::{Platform, PostedPolicy};
use crate::services::retry::RetryPolicy;

#[derive(Debug, Deserialize, Validate)]
#[garde(allow_unvalidated)]
pub struct AppConfig {
    // ── Feed ─────────────────────────────────────────────────────────
    /// Google Sheets spreadsheet holding the product feed
    pub feed_spreadsheet_id: String,

    /// Tab inside the spreadsheet
    #[serde(default = "default_sheet_name")]
    pub feed_sheet_name: String,

    /// OAuth bearer token with spreadsheets scope
    pub sheets_access_token: String,

    #[serde(default = "default_sheets_base_url")]
    pub sheets_base_url: String,

    // ── Columns ──────────────────────────────────────────────────────
    /// Job id aliases, first non-empty wins
    #[serde(default = "default_job_id_columns")]
    #[garde(length(min = 1))]
    pub job_id_columns: Vec<String>,

    #[serde(default = "default_posted_column")]
    #[garde(length(min = 1))]
    pub posted_column: String,

    #[serde(default = "default_ready_column")]
    pub ready_column: String,

    /// Columns carrying a ready-made video URL supplied with the row
    #[serde(default = "default_direct_video_url_columns")]
    pub direct_video_url_columns: Vec<String>,

    #[serde(default = "default_title_columns")]
    pub title_columns: Vec<String>,

    #[serde(default = "default_details_columns")]
    pub details_columns: Vec<String>,

    #[serde(default = "default_caption_columns")]
    pub caption_columns: Vec<String>,

    // ── Flags ────────────────────────────────────────────────────────
    #[serde(default)]
    pub force_reprocess: bool,

    /// Acquire videos and log, but never post or write back
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub skip_url_probe: bool,

    /// `any` or `all`
    #[serde(default = "default_posted_policy")]
    pub posted_policy: String,

    // ── Platforms ────────────────────────────────────────────────────
    #[serde(default = "default_enabled_platforms")]
    pub enabled_platforms: Vec<String>,

    pub facebook_page_id: Option<String>,
    pub facebook_page_token: Option<String>,
    pub instagram_user_id: Option<String>,
    pub instagram_access_token: Option<String>,
    pub x_access_token: Option<String>,
    pub linkedin_access_token: Option<String>,
    pub linkedin_author_urn: Option<String>,

    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,

    #[serde(default = "default_x_base_url")]
    pub x_base_url: String,

    #[serde(default = "default_linkedin_base_url")]
    pub linkedin_base_url: String,

    #[serde(default = "default_platform_max_attempts")]
    #[garde(range(min = 1, max = 10))]
    pub platform_max_attempts: u32,

    #[serde(default = "default_platform_backoff_base_ms")]
    pub platform_backoff_base_ms: u64,

    #[serde(default = "default_platform_backoff_max_ms")]
    #[garde(custom(at_least(self.platform_backoff_base_ms)))]
    pub platform_backoff_max_ms: u64,

    /// Minimum spacing between calls to the same platform
    #[serde(default = "default_platform_min_interval_ms")]
    pub platform_min_interval_ms: u64,

    /// Upper bound on one platform's attempts (including backoff) for a row;
    /// never extends past the run timeout
    #[serde(default = "default_platform_window_secs")]
    #[garde(range(min = 1, max = 86_400))]
    pub platform_window_secs: u64,

    // ── Providers ────────────────────────────────────────────────────
    pub heygen_api_key: Option<String>,

    #[serde(default = "default_heygen_base_url")]
    pub heygen_base_url: String,

    /// Cloudflare account for Workers AI script generation
    pub cf_account_id: Option<String>,
    pub cf_api_token: Option<String>,

    #[serde(default = "default_workers_ai_base_url")]
    pub workers_ai_base_url: String,

    #[serde(default = "default_avatar_id")]
    #[garde(length(min = 1))]
    pub default_avatar_id: String,

    #[serde(default = "default_voice_id")]
    #[garde(length(min = 1))]
    pub default_voice_id: String,

    #[serde(default = "default_duration_secs")]
    #[garde(range(min = 5, max = 600))]
    pub default_duration_secs: u32,

    /// JSON file with category rules for avatar/voice selection
    pub avatar_rules_path: Option<String>,

    #[serde(default = "default_submit_max_attempts")]
    #[garde(range(min = 1, max = 5))]
    pub submit_max_attempts: u32,

    // ── Timing ───────────────────────────────────────────────────────
    #[serde(default = "default_poll_interval_secs")]
    #[garde(range(min = 1))]
    pub poll_interval_secs: u64,

    /// Must leave `posting_reserve_secs` of margin inside the run timeout
    #[serde(default = "default_poll_timeout_secs")]
    #[garde(custom(leaves_margin(self.run_timeout_secs, self.posting_reserve_secs)))]
    pub poll_timeout_secs: u64,

    /// At most one day
    #[serde(default = "default_run_timeout_secs")]
    #[garde(range(min = 1, max = 86_400))]
    pub run_timeout_secs: u64,

    #[serde(default = "default_posting_reserve_secs")]
    pub posting_reserve_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    #[garde(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,

    #[serde(default = "default_diagnostic_sample_limit")]
    pub diagnostic_sample_limit: usize,

    // ── Observability ────────────────────────────────────────────────
    /// Prometheus textfile written at the end of each run; logged when unset
    pub metrics_textfile_path: Option<String>,
}

fn default_sheet_name() -> String {
    "Sheet1".to_string()
}
fn default_sheets_base_url() -> String {
    "https://sheets.googleapis.com".to_string()
}
fn default_job_id_columns() -> Vec<String> {
    to_strings(&["Job ID", "job_id", "JobID", "ID", "SKU"])
}
fn default_posted_column() -> String {
    "Posted".to_string()
}
fn default_ready_column() -> String {
    "Ready".to_string()
}
fn default_direct_video_url_columns() -> Vec<String> {
    to_strings(&["Direct Video URL", "video_url"])
}
fn default_title_columns() -> Vec<String> {
    to_strings(&["Title", "Product Name", "Name"])
}
fn default_details_columns() -> Vec<String> {
    to_strings(&["Details", "Description"])
}
fn default_caption_columns() -> Vec<String> {
    to_strings(&["Caption"])
}
fn default_posted_policy() -> String {
    "any".to_string()
}
fn default_enabled_platforms() -> Vec<String> {
    to_strings(&["facebook", "instagram", "x", "linkedin"])
}
fn default_graph_base_url() -> String {
    "https://graph.facebook.com/v19.0".to_string()
}
fn default_x_base_url() -> String {
    "https://api.x.com".to_string()
}
fn default_linkedin_base_url() -> String {
    "https://api.linkedin.com".to_string()
}
fn default_platform_max_attempts() -> u32 {
    3
}
fn default_platform_backoff_base_ms() -> u64 {
    2_000
}
fn default_platform_backoff_max_ms() -> u64 {
    60_000
}
fn default_platform_min_interval_ms() -> u64 {
    1_000
}
fn default_platform_window_secs() -> u64 {
    300
}
fn default_heygen_base_url() -> String {
    "https://api.heygen.com".to_string()
}
fn default_workers_ai_base_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}
fn default_avatar_id() -> String {
    "Daisy-inskirt-20220818".to_string()
}
fn default_voice_id() -> String {
    "2d5b0e6cf36f460aa7fc47e3eee4ba54".to_string()
}
fn default_duration_secs() -> u32 {
    30
}
fn default_submit_max_attempts() -> u32 {
    1
}
fn default_poll_interval_secs() -> u64 {
    15
}
fn default_poll_timeout_secs() -> u64 {
    600
}
fn default_run_timeout_secs() -> u64 {
    3_300
}
fn default_posting_reserve_secs() -> u64 {
    120
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_diagnostic_sample_limit() -> usize {
    5
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn at_least(min: u64) -> impl FnOnce(&u64, &()) -> garde::Result {
    move |value, _| {
        if *value >= min {
            Ok(())
        } else {
            Err(garde::Error::new(format!("must be at least {}", min)))
        }
    }
}

fn leaves_margin(run_timeout: u64, reserve: u64) -> impl FnOnce(&u64, &()) -> garde::Result {
    move |value, _| {
        if value.saturating_add(reserve) < run_timeout {
            Ok(())
        } else {
            Err(garde::Error::new(format!(
                "poll timeout plus {}s posting reserve must stay below the {}s run timeout",
                reserve, run_timeout
            )))
        }
    }
}

/// Treat blank environment values as absent.
fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: AppConfig = envy::from_env()?;
        config.check()?;
        Ok(config)
    }

    /// garde rules plus checks on the string-typed enums.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()
            .map_err(|report| ConfigError::Invalid(report.to_string()))?;
        self.posted_policy()?;
        self.platform_names()?;
        Ok(())
    }

    pub fn posted_policy(&self) -> Result<PostedPolicy, ConfigError> {
        self.posted_policy.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "posted_policy must be 'any' or 'all', got '{}'",
                self.posted_policy
            ))
        })
    }

    pub fn platform_names(&self) -> Result<Vec<Platform>, ConfigError> {
        let mut platforms = Vec::new();
        for name in self.enabled_platforms.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            let platform: Platform = name
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("Unknown platform '{}'", name)))?;
            if !platforms.contains(&platform) {
                platforms.push(platform);
            }
        }
        Ok(platforms)
    }

    pub fn platform_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.platform_max_attempts,
            Duration::from_millis(self.platform_backoff_base_ms),
            Duration::from_millis(self.platform_backoff_max_ms),
        )
    }

    pub fn submit_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.submit_max_attempts,
            Duration::from_millis(self.platform_backoff_base_ms),
            Duration::from_millis(self.platform_backoff_max_ms),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ── Platform credentials ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCredentials {
    Facebook { page_id: String, page_token: String },
    Instagram { user_id: String, access_token: String },
    X { access_token: String },
    LinkedIn { access_token: String, author_urn: String },
}

impl PlatformCredentials {
    pub fn platform(&self) -> Platform {
        match self {
            Self::Facebook { .. } => Platform::Facebook,
            Self::Instagram { .. } => Platform::Instagram,
            Self::X { .. } => Platform::X,
            Self::LinkedIn { .. } => Platform::LinkedIn,
        }
    }
}

/// Explicit view of which platforms this run may post to.
#[derive(Debug, Clone, Default)]
pub struct PlatformSettings {
    pub enabled: Vec<PlatformCredentials>,
    /// Requested platforms dropped for missing credentials, with the missing settings.
    pub disabled: Vec<(Platform, String)>,
}

impl PlatformSettings {
    pub fn resolve(config: &AppConfig) -> Result<Self, ConfigError> {
        let mut settings = PlatformSettings::default();

        for platform in config.platform_names()? {
            let credentials = match platform {
                Platform::Facebook => {
                    match (non_blank(&config.facebook_page_id), non_blank(&config.facebook_page_token)) {
                        (Some(page_id), Some(page_token)) => {
                            Ok(PlatformCredentials::Facebook { page_id, page_token })
                        }
                        _ => Err("FACEBOOK_PAGE_ID and FACEBOOK_PAGE_TOKEN"),
                    }
                }
                Platform::Instagram => match (
                    non_blank(&config.instagram_user_id),
                    non_blank(&config.instagram_access_token),
                ) {
                    (Some(user_id), Some(access_token)) => {
                        Ok(PlatformCredentials::Instagram { user_id, access_token })
                    }
                    _ => Err("INSTAGRAM_USER_ID and INSTAGRAM_ACCESS_TOKEN"),
                },
                Platform::X => match non_blank(&config.x_access_token) {
                    Some(access_token) => Ok(PlatformCredentials::X { access_token }),
                    None => Err("X_ACCESS_TOKEN"),
                },
                Platform::LinkedIn => match (
                    non_blank(&config.linkedin_access_token),
                    non_blank(&config.linkedin_author_urn),
                ) {
                    (Some(access_token), Some(author_urn)) => {
                        Ok(PlatformCredentials::LinkedIn { access_token, author_urn })
                    }
                    _ => Err("LINKEDIN_ACCESS_TOKEN and LINKEDIN_AUTHOR_URN"),
                },
            };

            match credentials {
                Ok(c) => settings.enabled.push(c),
                Err(missing) => {
                    warn!(platform = %platform, missing, "Platform disabled: credentials not set");
                    settings.disabled.push((platform, missing.to_string()));
                }
            }
        }

        Ok(settings)
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        let vars = vec![
            ("FEED_SPREADSHEET_ID".to_string(), "sheet-1".to_string()),
            ("SHEETS_ACCESS_TOKEN".to_string(), "token".to_string()),
        ];
        envy::from_iter(vars).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = base_config();
        assert_eq!(config.job_id_columns[0], "Job ID");
        assert_eq!(config.posted_column, "Posted");
        assert_eq!(config.platform_max_attempts, 3);
        assert!(!config.dry_run);
        assert!(config.check().is_ok());
        assert_eq!(config.posted_policy().unwrap(), PostedPolicy::Any);
    }

    #[test]
    fn test_comma_separated_lists() {
        let vars = vec![
            ("FEED_SPREADSHEET_ID".to_string(), "sheet-1".to_string()),
            ("SHEETS_ACCESS_TOKEN".to_string(), "token".to_string()),
            ("JOB_ID_COLUMNS".to_string(), "Asin,SKU".to_string()),
            ("ENABLED_PLATFORMS".to_string(), "x,Facebook,x".to_string()),
        ];
        let config: AppConfig = envy::from_iter(vars).unwrap();
        assert_eq!(config.job_id_columns, vec!["Asin", "SKU"]);
        assert_eq!(
            config.platform_names().unwrap(),
            vec![Platform::X, Platform::Facebook]
        );
    }

    #[test]
    fn test_poll_timeout_must_leave_margin() {
        let mut config = base_config();
        config.run_timeout_secs = 600;
        config.poll_timeout_secs = 500;
        config.posting_reserve_secs = 120;
        assert!(matches!(config.check(), Err(ConfigError::Invalid(_))));

        config.poll_timeout_secs = 400;
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_rejects_unknown_platform_and_policy() {
        let mut config = base_config();
        config.enabled_platforms = vec!["myspace".into()];
        assert!(config.check().is_err());

        let mut config = base_config();
        config.posted_policy = "most".into();
        assert!(config.check().is_err());
    }

    #[test]
    fn test_run_timeout_is_bounded() {
        let mut config = base_config();
        config.run_timeout_secs = u64::MAX;
        assert!(matches!(config.check(), Err(ConfigError::Invalid(_))));

        config.run_timeout_secs = 86_400;
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_attempt_range_enforced() {
        let mut config = base_config();
        config.platform_max_attempts = 0;
        assert!(config.check().is_err());
    }

    #[test]
    fn test_platforms_without_credentials_are_disabled() {
        let mut config = base_config();
        config.facebook_page_id = Some("123".into());
        config.facebook_page_token = Some("tok".into());
        config.x_access_token = Some("   ".into());

        let settings = PlatformSettings::resolve(&config).unwrap();
        assert_eq!(settings.enabled.len(), 1);
        assert_eq!(settings.enabled[0].platform(), Platform::Facebook);

        let disabled: Vec<Platform> = settings.disabled.iter().map(|(p, _)| *p).collect();
        assert_eq!(
            disabled,
            vec![Platform::Instagram, Platform::X, Platform::LinkedIn]
        );
    }
}
