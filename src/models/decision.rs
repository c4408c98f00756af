use serde::Serialize;
use std::collections::BTreeMap;
use strum::{Display, EnumString};

/// Why the row filter rejected a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    NoJobId,
    AlreadyPosted,
    NotReady,
}

/// The field values that led to a skip, kept for operator diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipEvidence {
    pub line_number: usize,
    pub fields: BTreeMap<String, String>,
}

/// Row filter verdict for a single row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ProcessingDecision {
    Skip {
        row_index: usize,
        reason: SkipReason,
        evidence: SkipEvidence,
    },
    Accept {
        row_index: usize,
        job_id: String,
    },
}

impl ProcessingDecision {
    pub fn row_index(&self) -> usize {
        match self {
            Self::Skip { row_index, .. } | Self::Accept { row_index, .. } => *row_index,
        }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skip { reason, .. } => Some(*reason),
            Self::Accept { .. } => None,
        }
    }
}
