use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use product_reels::{
    app_state::AppState,
    config::AppConfig,
    services::clock::{Clock, SystemClock},
    telemetry,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    // Initialize Prometheus metrics recorder
    let metrics_handle = match telemetry::install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize metrics");
            return ExitCode::FAILURE;
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = match AppState::new(&config, clock) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize services");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        spreadsheet_id = %config.feed_spreadsheet_id,
        sheet = %config.feed_sheet_name,
        platforms = ?state.enabled_platforms(),
        disabled = ?state.platforms.disabled,
        dry_run = config.dry_run,
        force_reprocess = config.force_reprocess,
        "Starting product reels run"
    );

    let result = state.pipeline.run(state.sheets.as_ref()).await;
    export_metrics(&metrics_handle, config.metrics_textfile_path.as_deref());

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "Run aborted");
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!(error = %e, "Failed to render run report"),
    }

    if report.processed_rows == 0 && report.diagnostics.accepted_rows == 0 {
        tracing::warn!(
            hints = ?report.diagnostics.hints,
            available_columns = ?report.diagnostics.available_columns,
            "No rows were processed"
        );
    }

    ExitCode::SUCCESS
}

/// Write the run's metrics for a textfile collector, or log them when no path is set.
fn export_metrics(handle: &PrometheusHandle, path: Option<&str>) {
    match path {
        Some(path) => match telemetry::write_textfile(handle, Path::new(path)) {
            Ok(()) => tracing::info!(path, "Metrics written"),
            Err(e) => tracing::warn!(error = %e, "Failed to export metrics"),
        },
        None => tracing::info!(metrics = %handle.render(), "Run metrics"),
    }
}
