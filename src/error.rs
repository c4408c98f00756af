use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use strum::{Display, EnumString};

/// Failure classes shared by every I/O-touching component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Transient,
    Auth,
    Timeout,
    NotConfigured,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transient provider error: {message}")]
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("{0} is not configured")]
    NotConfigured(String),
}

impl PipelineError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::NotConfigured(_) => ErrorKind::NotConfigured,
        }
    }

    /// Only transient failures can change outcome on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> Self {
        let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 300));
        match status.as_u16() {
            401 | 403 => Self::Auth(message),
            408 | 425 | 429 => Self::Transient {
                message,
                retry_after,
            },
            s if s >= 500 => Self::Transient {
                message,
                retry_after,
            },
            _ => Self::Validation(message),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return Self::Validation(format!("Invalid request: {}", err));
        }
        if let Some(status) = err.status() {
            return Self::from_status(status, &err.to_string(), None);
        }
        // Timeouts, connect failures and undecodable bodies are all worth another try.
        Self::transient(format!("HTTP request failed: {}", err))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::transient(format!("Malformed provider response: {}", err))
    }
}

/// Pass successful responses through; turn everything else into a classified error.
pub async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, PipelineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();

    Err(PipelineError::from_status(status, &body, retry_after))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(max_chars).collect();
        cut.push('…');
        cut
    }
}
