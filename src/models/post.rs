use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::error::ErrorKind;

/// Social distribution targets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Platform {
    Facebook,
    Instagram,
    X,
    #[strum(serialize = "linkedin")]
    LinkedIn,
}

/// How an adapter delivers the video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PostMode {
    /// The platform ingests the video file itself.
    Native,
    /// Caption plus a link to the hosted video.
    LinkOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PostOutcome {
    Success {
        external_id: String,
        attempts: u32,
    },
    Failure {
        error_kind: ErrorKind,
        attempts: u32,
        message: String,
    },
    /// Dry run: the call was suppressed.
    DryRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostResult {
    pub platform: Platform,
    pub mode: PostMode,
    pub outcome: PostOutcome,
    pub timestamp: DateTime<Utc>,
}

impl PostResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PostOutcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, PostOutcome::Failure { .. })
    }

    /// Compact cell text, e.g. `facebook: ok 123` or `x: transient after 3 attempts`.
    pub fn summary(&self) -> String {
        match &self.outcome {
            PostOutcome::Success { external_id, .. } => {
                format!("{}: ok {}", self.platform, external_id)
            }
            PostOutcome::Failure {
                error_kind,
                attempts,
                ..
            } => format!(
                "{}: {} after {} attempt{}",
                self.platform,
                error_kind,
                attempts,
                if *attempts == 1 { "" } else { "s" }
            ),
            PostOutcome::DryRun => format!("{}: dry run", self.platform),
        }
    }
}

/// When a row counts as posted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PostedPolicy {
    /// At least one enabled platform succeeded.
    #[default]
    Any,
    /// Every enabled platform succeeded.
    All,
}

impl PostedPolicy {
    pub fn is_posted(self, results: &[PostResult]) -> bool {
        match self {
            Self::Any => results.iter().any(PostResult::is_success),
            Self::All => !results.is_empty() && results.iter().all(PostResult::is_success),
        }
    }
}

/// Every platform outcome for one row plus the row-level verdict.
#[derive(Debug, Clone, Serialize)]
pub struct RowPostReport {
    pub results: Vec<PostResult>,
    pub posted: bool,
}

impl RowPostReport {
    pub fn failures(&self) -> impl Iterator<Item = &PostResult> {
        self.results.iter().filter(|r| r.is_failure())
    }
}
