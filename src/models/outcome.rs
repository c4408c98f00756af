use serde::Serialize;

use crate::error::ErrorKind;
use crate::models::post::PostResult;
use crate::models::video::AvatarMapping;

/// Final result of one accepted row, staged for writeback.
#[derive(Debug, Clone, Serialize)]
pub struct RowOutcome {
    pub row_index: usize,
    pub job_id: String,
    pub posted: bool,
    pub video_url: Option<String>,
    /// `provided`, `reused`, `ready`, `failed`, `timed_out` or `not_configured`.
    pub video_status: String,
    pub mapping: Option<AvatarMapping>,
    pub post_results: Vec<PostResult>,
    pub last_error: Option<String>,
    /// Set when no video could be acquired; such rows never reach posting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquisition_error: Option<ErrorKind>,
}
