//! Prometheus recorder for the run's metrics.
//!
//! The binary is a one-shot batch job, so there is no scrape endpoint. At the
//! end of a run the recorder is rendered in text exposition format and either
//! written to a node-exporter textfile or logged.

use std::path::Path;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to install Prometheus metrics recorder: {0}")]
    Install(#[from] BuildError),

    #[error("Failed to write metrics to {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Install the global recorder and describe every metric the pipeline emits.
pub fn install_recorder() -> Result<PrometheusHandle, TelemetryError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

pub fn describe_metrics() {
    metrics::describe_counter!("reels_rows_total", "Accepted rows entering the pipeline");
    metrics::describe_counter!("reels_rows_skipped_total", "Rows skipped by the filter, by reason");
    metrics::describe_counter!("reels_videos_generated_total", "Videos generated to completion");
    metrics::describe_counter!("reels_video_failures_total", "Video acquisitions that failed, by kind");
    metrics::describe_counter!("reels_posts_total", "Platform post attempts, by platform and outcome");
    metrics::describe_counter!("reels_writeback_failures_total", "Row writebacks that failed");
    metrics::describe_histogram!(
        "reels_video_generation_seconds",
        "Time from submission to a ready video"
    );
}

/// Render the recorder and write it to `path`, replacing the previous run's file.
///
/// The file is written next to its target and renamed so a collector never
/// reads a half-written file.
pub fn write_textfile(handle: &PrometheusHandle, path: &Path) -> Result<(), TelemetryError> {
    let write_err = |source| TelemetryError::Write {
        path: path.display().to_string(),
        source,
    };
    let staging = path.with_extension("prom.tmp");
    std::fs::write(&staging, handle.render()).map_err(write_err)?;
    std::fs::rename(&staging, path).map_err(write_err)
}
