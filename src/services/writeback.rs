//! Feed capabilities and the mapping of row outcomes onto named columns.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::models::outcome::RowOutcome;
use crate::models::row::Feed;

/// Read-only snapshot of the feed for one run.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_rows(&self) -> Result<Feed, PipelineError>;
}

/// Incremental per-row writes. Columns that do not exist yet must be created.
#[async_trait]
pub trait FeedSink: Send + Sync {
    async fn set_cells(&self, row_index: usize, cells: &[CellUpdate]) -> Result<(), PipelineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    pub column: String,
    pub value: String,
}

impl CellUpdate {
    fn new(column: &str, value: impl Into<String>) -> Self {
        Self {
            column: column.to_string(),
            value: value.into(),
        }
    }
}

/// Target column names for row outcomes.
#[derive(Debug, Clone)]
pub struct WritebackColumns {
    pub posted: String,
    pub posted_at: String,
    pub video_url: String,
    pub video_status: String,
    pub avatar: String,
    pub voice: String,
    pub mapping_reason: String,
    pub duration: String,
    pub post_results: String,
    pub last_error: String,
}

impl Default for WritebackColumns {
    fn default() -> Self {
        Self {
            posted: "Posted".to_string(),
            posted_at: "Posted At".to_string(),
            video_url: "Video URL".to_string(),
            video_status: "Video Status".to_string(),
            avatar: "Avatar".to_string(),
            voice: "Voice".to_string(),
            mapping_reason: "Mapping Reason".to_string(),
            duration: "Duration (s)".to_string(),
            post_results: "Post Results".to_string(),
            last_error: "Last Error".to_string(),
        }
    }
}

impl WritebackColumns {
    pub fn with_posted_column(posted: &str) -> Self {
        Self {
            posted: posted.to_string(),
            ..Self::default()
        }
    }
}

/// Cells recording `outcome`. The posted flag is only ever set, never cleared.
pub fn cells_for(outcome: &RowOutcome, columns: &WritebackColumns, now: DateTime<Utc>) -> Vec<CellUpdate> {
    let mut cells = Vec::new();

    if outcome.posted {
        cells.push(CellUpdate::new(&columns.posted, "TRUE"));
        cells.push(CellUpdate::new(
            &columns.posted_at,
            now.to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
    }
    if let Some(url) = &outcome.video_url {
        cells.push(CellUpdate::new(&columns.video_url, url.as_str()));
    }
    cells.push(CellUpdate::new(&columns.video_status, outcome.video_status.as_str()));

    if let Some(mapping) = &outcome.mapping {
        cells.push(CellUpdate::new(&columns.avatar, mapping.avatar_id.as_str()));
        cells.push(CellUpdate::new(&columns.voice, mapping.voice_id.as_str()));
        cells.push(CellUpdate::new(&columns.mapping_reason, mapping.reason.as_str()));
        cells.push(CellUpdate::new(&columns.duration, mapping.duration_secs.to_string()));
    }

    if !outcome.post_results.is_empty() {
        let summary = outcome
            .post_results
            .iter()
            .map(|r| r.summary())
            .collect::<Vec<_>>()
            .join("; ");
        cells.push(CellUpdate::new(&columns.post_results, summary));
    }

    // Empty on success so a stale error from an earlier run is cleared.
    cells.push(CellUpdate::new(
        &columns.last_error,
        outcome.last_error.clone().unwrap_or_default(),
    ));

    cells
}

/// Best-effort persistence of row outcomes onto the feed.
pub struct WritebackAdapter {
    sink: Arc<dyn FeedSink>,
    columns: WritebackColumns,
}

impl WritebackAdapter {
    pub fn new(sink: Arc<dyn FeedSink>, columns: WritebackColumns) -> Self {
        Self { sink, columns }
    }

    /// Write one row. Failures are logged and returned for counting; they never undo posts.
    pub async fn write(&self, outcome: &RowOutcome, now: DateTime<Utc>) -> Result<(), PipelineError> {
        let cells = cells_for(outcome, &self.columns, now);
        match self.sink.set_cells(outcome.row_index, &cells).await {
            Ok(()) => {
                info!(
                    job_id = %outcome.job_id,
                    row = outcome.row_index + 2,
                    cells = cells.len(),
                    posted = outcome.posted,
                    "Row outcome written back"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    job_id = %outcome.job_id,
                    row = outcome.row_index + 2,
                    error = %e,
                    "Writeback failed, posts already made are kept"
                );
                metrics::counter!("reels_writeback_failures_total").increment(1);
                Err(e)
            }
        }
    }
}
