use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::models::decision::{SkipEvidence, SkipReason};
use crate::models::post::Platform;

/// Skip counters broken down by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipCounts {
    pub no_job_id: usize,
    pub already_posted: usize,
    pub not_ready: usize,
}

impl SkipCounts {
    pub fn increment(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::NoJobId => self.no_job_id += 1,
            SkipReason::AlreadyPosted => self.already_posted += 1,
            SkipReason::NotReady => self.not_ready += 1,
        }
    }

    pub fn get(&self, reason: SkipReason) -> usize {
        match reason {
            SkipReason::NoJobId => self.no_job_id,
            SkipReason::AlreadyPosted => self.already_posted,
            SkipReason::NotReady => self.not_ready,
        }
    }

    pub fn total(&self) -> usize {
        self.no_job_id + self.already_posted + self.not_ready
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipSample {
    pub reason: SkipReason,
    #[serde(flatten)]
    pub evidence: SkipEvidence,
}

/// Row filter summary for one run. Never persisted beyond the run report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDiagnostics {
    pub total_lines: usize,
    pub accepted_rows: usize,
    pub skipped_rows: usize,
    pub skip_reasons: SkipCounts,
    pub samples: Vec<SkipSample>,
    pub hints: Vec<String>,
    pub available_columns: Vec<String>,
}

/// End-of-run summary combining filter diagnostics and per-row pipeline results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub total_rows: usize,
    pub skipped_rows: usize,
    pub processed_rows: usize,
    pub posted_rows: usize,
    pub failed_rows: usize,
    pub acquisition_timeouts: usize,
    pub acquisition_failures: BTreeMap<ErrorKind, usize>,
    pub platform_failures: BTreeMap<Platform, usize>,
    pub writeback_failures: usize,
    /// Accepted rows left for the next invocation because the run deadline passed.
    pub unprocessed_rows: usize,
    pub diagnostics: RunDiagnostics,
}

impl RunReport {
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>, dry_run: bool, diagnostics: RunDiagnostics) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: None,
            dry_run,
            total_rows: diagnostics.total_lines,
            skipped_rows: diagnostics.skipped_rows,
            processed_rows: 0,
            posted_rows: 0,
            failed_rows: 0,
            acquisition_timeouts: 0,
            acquisition_failures: BTreeMap::new(),
            platform_failures: BTreeMap::new(),
            writeback_failures: 0,
            unprocessed_rows: 0,
            diagnostics,
        }
    }

    pub fn platform_failure_total(&self) -> usize {
        self.platform_failures.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_counts_serialize_camel_case() {
        let mut counts = SkipCounts::default();
        counts.increment(SkipReason::NoJobId);
        counts.increment(SkipReason::AlreadyPosted);

        let json = serde_json::to_value(counts).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"noJobId": 1, "alreadyPosted": 1, "notReady": 0})
        );
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn test_sample_flattens_evidence() {
        let sample = SkipSample {
            reason: SkipReason::NotReady,
            evidence: SkipEvidence {
                line_number: 4,
                fields: [("Ready".to_string(), "no".to_string())].into_iter().collect(),
            },
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["reason"], "notReady");
        assert_eq!(json["lineNumber"], 4);
        assert_eq!(json["fields"]["Ready"], "no");
    }
}
