//! Row classification and skip diagnostics.
//!
//! Every row is classified in feed order as accepted or skipped:
//! - no job id in any alias column → `NoJobId`
//! - posted flag set and reprocessing not forced → `AlreadyPosted`
//! - ready column present but not truthy → `NotReady`
//!
//! When nothing is accepted the diagnostics carry hints and the header list so
//! a misnamed column is visible without reading code.

use std::collections::BTreeMap;

use strsim::jaro_winkler;
use tracing::{debug, info, warn};

use crate::models::decision::{ProcessingDecision, SkipEvidence, SkipReason};
use crate::models::diagnostics::{RunDiagnostics, SkipCounts, SkipSample};
use crate::models::row::{is_truthy, Feed, Row};

/// Minimum similarity for suggesting an existing header in place of a missing one.
const COLUMN_SUGGESTION_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub job_id_columns: Vec<String>,
    pub posted_column: String,
    pub ready_column: Option<String>,
    pub force_reprocess: bool,
    /// How many skipped rows per reason are captured verbatim.
    pub sample_limit: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            job_id_columns: vec!["Job ID".to_string()],
            posted_column: "Posted".to_string(),
            ready_column: Some("Ready".to_string()),
            force_reprocess: false,
            sample_limit: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterResult {
    pub decisions: Vec<ProcessingDecision>,
    pub diagnostics: RunDiagnostics,
}

impl FilterResult {
    pub fn accepted(&self) -> impl Iterator<Item = (usize, &str)> {
        self.decisions.iter().filter_map(|d| match d {
            ProcessingDecision::Accept { row_index, job_id } => Some((*row_index, job_id.as_str())),
            ProcessingDecision::Skip { .. } => None,
        })
    }
}

/// Classify a single row.
pub fn classify_row(row: &Row, config: &FilterConfig) -> ProcessingDecision {
    let Some((_, job_id)) = row.first_non_empty(&config.job_id_columns) else {
        return skip(row, SkipReason::NoJobId, evidence_columns(config));
    };

    if let Some(posted) = row.get(&config.posted_column) {
        if is_truthy(posted) && !config.force_reprocess {
            return skip(row, SkipReason::AlreadyPosted, evidence_columns(config));
        }
    }

    if let Some(ready_column) = &config.ready_column {
        // A missing ready column never blocks; only an explicit non-truthy value does.
        if let Some(ready) = row.get(ready_column) {
            if !is_truthy(ready) {
                return skip(row, SkipReason::NotReady, evidence_columns(config));
            }
        }
    }

    ProcessingDecision::Accept {
        row_index: row.index,
        job_id: job_id.to_string(),
    }
}

/// Classify every row of the feed and build the run diagnostics.
pub fn filter_rows(feed: &Feed, config: &FilterConfig) -> FilterResult {
    let mut counts = SkipCounts::default();
    let mut samples = Vec::new();
    let mut sampled: BTreeMap<SkipReason, usize> = BTreeMap::new();
    let mut decisions = Vec::with_capacity(feed.rows.len());

    for row in &feed.rows {
        let decision = classify_row(row, config);

        if let ProcessingDecision::Skip {
            reason, evidence, ..
        } = &decision
        {
            counts.increment(*reason);
            metrics::counter!("reels_rows_skipped_total", "reason" => reason.to_string()).increment(1);

            let taken = sampled.entry(*reason).or_default();
            if *taken < config.sample_limit {
                *taken += 1;
                samples.push(SkipSample {
                    reason: *reason,
                    evidence: evidence.clone(),
                });
            }
            debug!(line = row.line_number(), reason = %reason, "Row skipped");
        }

        decisions.push(decision);
    }

    let accepted_rows = decisions.iter().filter(|d| d.is_accept()).count();
    let mut diagnostics = RunDiagnostics {
        total_lines: feed.rows.len(),
        accepted_rows,
        skipped_rows: counts.total(),
        skip_reasons: counts,
        samples,
        hints: Vec::new(),
        available_columns: feed.headers.clone(),
    };

    if accepted_rows == 0 {
        diagnostics.hints = troubleshooting_hints(feed, config, &counts);
        warn!(
            total_lines = diagnostics.total_lines,
            no_job_id = counts.no_job_id,
            already_posted = counts.already_posted,
            not_ready = counts.not_ready,
            available_columns = ?feed.headers,
            "No rows accepted for processing"
        );
        for hint in &diagnostics.hints {
            warn!(hint = %hint, "Troubleshooting hint");
        }
    } else {
        info!(
            total_lines = diagnostics.total_lines,
            accepted = accepted_rows,
            skipped = diagnostics.skipped_rows,
            "Rows classified"
        );
    }

    FilterResult {
        decisions,
        diagnostics,
    }
}

fn skip(row: &Row, reason: SkipReason, columns: Vec<&str>) -> ProcessingDecision {
    let fields = columns
        .into_iter()
        .filter_map(|col| row.get(col).map(|v| (col.to_string(), v.to_string())))
        .collect();

    ProcessingDecision::Skip {
        row_index: row.index,
        reason,
        evidence: SkipEvidence {
            line_number: row.line_number(),
            fields,
        },
    }
}

/// Columns worth showing for a skipped row: every configured filter column.
fn evidence_columns(config: &FilterConfig) -> Vec<&str> {
    config
        .job_id_columns
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(config.posted_column.as_str()))
        .chain(config.ready_column.as_deref())
        .collect()
}

/// Closest existing header to `wanted`, if any is similar enough.
pub fn suggest_column<'a>(headers: &'a [String], wanted: &str) -> Option<&'a str> {
    headers
        .iter()
        .map(|h| (h, jaro_winkler(&h.to_lowercase(), &wanted.to_lowercase())))
        .filter(|(_, score)| *score >= COLUMN_SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(h, _)| h.as_str())
}

fn troubleshooting_hints(feed: &Feed, config: &FilterConfig, counts: &SkipCounts) -> Vec<String> {
    let mut hints = Vec::new();

    if feed.rows.is_empty() {
        hints.push("The feed has no data rows below the header line.".to_string());
    }

    if counts.no_job_id > 0 {
        let present: Vec<&String> = config
            .job_id_columns
            .iter()
            .filter(|c| feed.has_column(c))
            .collect();
        if present.is_empty() {
            hints.push(format!(
                "{} rows have no job id and none of the job-id columns {:?} exist in the feed.",
                counts.no_job_id, config.job_id_columns
            ));
            for wanted in &config.job_id_columns {
                if let Some(suggestion) = suggest_column(&feed.headers, wanted) {
                    hints.push(format!(
                        "Job-id column '{}' not found; did you mean '{}'?",
                        wanted, suggestion
                    ));
                }
            }
        } else {
            hints.push(format!(
                "{} rows have an empty job id in {:?}; fill them in or add another alias column.",
                counts.no_job_id, present
            ));
        }
    }

    if counts.already_posted > 0 {
        hints.push(format!(
            "{} rows already posted (column '{}'); enable FORCE_REPROCESS to regenerate them.",
            counts.already_posted, config.posted_column
        ));
    } else if !feed.has_column(&config.posted_column) {
        if let Some(suggestion) = suggest_column(&feed.headers, &config.posted_column) {
            hints.push(format!(
                "Posted column '{}' not found; did you mean '{}'? It will be created on first writeback.",
                config.posted_column, suggestion
            ));
        }
    }

    if counts.not_ready > 0 {
        if let Some(ready) = &config.ready_column {
            hints.push(format!(
                "{} rows are not marked ready in column '{}' (expected TRUE/yes/1).",
                counts.not_ready, ready
            ));
        }
    }

    hints.push(format!("Available columns: {}", feed.headers.join(", ")));
    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(headers: &[&str], lines: &[&[&str]]) -> Feed {
        Feed::from_lines(
            headers.iter().map(|h| h.to_string()).collect(),
            lines
                .iter()
                .map(|l| l.iter().map(|v| v.to_string()).collect())
                .collect(),
        )
    }

    fn config() -> FilterConfig {
        FilterConfig {
            job_id_columns: vec!["Job ID".into(), "SKU".into()],
            ..FilterConfig::default()
        }
    }

    #[test]
    fn test_missing_job_id_always_skipped() {
        let f = feed(
            &["Job ID", "SKU", "Posted", "Ready", "Title"],
            &[&["", "", "", "TRUE", "Great mug"], &["", "", "TRUE", "", ""]],
        );
        let result = filter_rows(&f, &config());
        for d in &result.decisions {
            assert_eq!(d.skip_reason(), Some(SkipReason::NoJobId));
        }
    }

    #[test]
    fn test_alias_fallback() {
        let f = feed(&["Job ID", "SKU"], &[&["", "SKU-1"]]);
        let result = filter_rows(&f, &config());
        assert_eq!(
            result.decisions[0],
            ProcessingDecision::Accept {
                row_index: 0,
                job_id: "SKU-1".into()
            }
        );
    }

    #[test]
    fn test_force_reprocess_flips_already_posted() {
        let f = feed(&["Job ID", "Posted"], &[&["A", "TRUE"], &["B", "yes"]]);

        let result = filter_rows(&f, &config());
        assert!(result
            .decisions
            .iter()
            .all(|d| d.skip_reason() == Some(SkipReason::AlreadyPosted)));

        let forced = FilterConfig {
            force_reprocess: true,
            ..config()
        };
        let result = filter_rows(&f, &forced);
        assert!(result.decisions.iter().all(|d| d.is_accept()));
    }

    #[test]
    fn test_ready_column_optional() {
        let without = feed(&["Job ID"], &[&["A"]]);
        assert!(filter_rows(&without, &config()).decisions[0].is_accept());

        let with = feed(&["Job ID", "Ready"], &[&["A", "FALSE"], &["B", ""], &["C", "1"]]);
        let result = filter_rows(&with, &config());
        assert_eq!(result.decisions[0].skip_reason(), Some(SkipReason::NotReady));
        assert_eq!(result.decisions[1].skip_reason(), Some(SkipReason::NotReady));
        assert!(result.decisions[2].is_accept());
    }

    #[test]
    fn test_three_row_scenario() {
        let f = feed(
            &["Job ID", "Posted", "Ready"],
            &[&["", "", "TRUE"], &["B", "TRUE", "TRUE"], &["C", "", "TRUE"]],
        );
        let result = filter_rows(&f, &config());

        assert_eq!(result.decisions[0].skip_reason(), Some(SkipReason::NoJobId));
        assert_eq!(result.decisions[1].skip_reason(), Some(SkipReason::AlreadyPosted));
        assert!(result.decisions[2].is_accept());

        let d = &result.diagnostics;
        assert_eq!(d.total_lines, 3);
        assert_eq!(d.skipped_rows, 2);
        assert_eq!(
            d.skip_reasons,
            SkipCounts {
                no_job_id: 1,
                already_posted: 1,
                not_ready: 0
            }
        );
        assert!(d.hints.is_empty());
    }

    #[test]
    fn test_samples_limited_per_reason() {
        let line: &[&str] = &["", ""];
        let lines = vec![line; 10];
        let f = feed(&["Job ID", "Posted"], &lines);
        let cfg = FilterConfig {
            sample_limit: 3,
            ..config()
        };
        let result = filter_rows(&f, &cfg);
        assert_eq!(result.diagnostics.samples.len(), 3);
        assert_eq!(result.diagnostics.samples[0].evidence.line_number, 2);
    }

    #[test]
    fn test_zero_accepted_produces_hints_and_columns() {
        let f = feed(&["JobId", "Posted"], &[&["A", "TRUE"], &["B", ""]]);
        let cfg = FilterConfig {
            job_id_columns: vec!["Job ID".into()],
            ..FilterConfig::default()
        };
        let result = filter_rows(&f, &cfg);

        assert_eq!(result.diagnostics.accepted_rows, 0);
        assert_eq!(result.diagnostics.available_columns, vec!["JobId", "Posted"]);
        let hints = result.diagnostics.hints.join("\n");
        assert!(hints.contains("did you mean 'JobId'"), "{hints}");
        assert!(hints.contains("Available columns: JobId, Posted"));
    }

    #[test]
    fn test_already_posted_hint_mentions_force() {
        let f = feed(&["Job ID", "Posted"], &[&["A", "TRUE"]]);
        let result = filter_rows(&f, &config());
        assert!(result.diagnostics.hints[0].contains("1 rows already posted"));
        assert!(result.diagnostics.hints[0].contains("FORCE_REPROCESS"));
    }

    #[test]
    fn test_suggest_column() {
        let headers = vec!["Product Title".to_string(), "Job_ID".to_string()];
        assert_eq!(suggest_column(&headers, "Job ID"), Some("Job_ID"));
        assert_eq!(suggest_column(&headers, "Zebra"), None);
    }
}
