//! Video-generation provider capability and the HeyGen client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{check_response, PipelineError};

/// Spoken words per second used to fit a script into a target duration.
const WORDS_PER_SECOND: f64 = 2.5;

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub script: String,
    pub avatar_id: String,
    pub voice_id: String,
    pub duration_secs: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    Ready(String),
    Failed(String),
    Pending,
}

#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Returns the provider's opaque job handle.
    async fn submit(&self, request: &VideoRequest) -> Result<String, PipelineError>;

    async fn poll(&self, provider_job_id: &str) -> Result<PollStatus, PipelineError>;
}

/// Existence check for an already-hosted video.
#[async_trait]
pub trait UrlProbe: Send + Sync {
    async fn exists(&self, url: &str) -> Result<bool, PipelineError>;
}

/// Trim a script to roughly `duration_secs` of speech, ending on a sentence when possible.
pub fn fit_script_to_duration(script: &str, duration_secs: u32) -> String {
    let budget = ((duration_secs as f64) * WORDS_PER_SECOND).floor().max(1.0) as usize;
    let words: Vec<&str> = script.split_whitespace().collect();
    if words.len() <= budget {
        return words.join(" ");
    }

    let cut = words[..budget].join(" ");
    match cut.rfind(['.', '!', '?']) {
        // Keep at least half the budget when backing up to a sentence end.
        Some(end) if cut[..end].split_whitespace().count() >= budget / 2 => cut[..=end].to_string(),
        _ => format!("{}.", cut.trim_end_matches([',', ';', ':'])),
    }
}

// ── HeyGen ───────────────────────────────────────────────────────────

pub struct HeyGenClient {
    http: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    data: Option<GenerateData>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct GenerateData {
    video_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    data: StatusData,
}

#[derive(Deserialize)]
struct StatusData {
    status: String,
    video_url: Option<String>,
    error: Option<serde_json::Value>,
}

impl HeyGenClient {
    pub fn new(http: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl VideoProvider for HeyGenClient {
    async fn submit(&self, request: &VideoRequest) -> Result<String, PipelineError> {
        let body = serde_json::json!({
            "video_inputs": [{
                "character": {
                    "type": "avatar",
                    "avatar_id": request.avatar_id,
                    "avatar_style": "normal"
                },
                "voice": {
                    "type": "text",
                    "input_text": fit_script_to_duration(&request.script, request.duration_secs),
                    "voice_id": request.voice_id
                }
            }],
            "dimension": { "width": 720, "height": 1280 }
        });

        let response = self
            .http
            .post(format!("{}/v2/video/generate", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = check_response(response).await?;

        let parsed: GenerateResponse = response.json().await?;
        match parsed.data {
            Some(data) if !data.video_id.is_empty() => Ok(data.video_id),
            _ => Err(PipelineError::Validation(format!(
                "HeyGen rejected the job: {}",
                parsed.error.map(|e| e.to_string()).unwrap_or_else(|| "no video_id returned".into())
            ))),
        }
    }

    async fn poll(&self, provider_job_id: &str) -> Result<PollStatus, PipelineError> {
        let response = self
            .http
            .get(format!("{}/v1/video_status.get", self.base_url))
            .query(&[("video_id", provider_job_id)])
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;
        let response = check_response(response).await?;

        let parsed: StatusResponse = response.json().await?;
        let data = parsed.data;
        Ok(match data.status.as_str() {
            "completed" => match data.video_url {
                Some(url) if !url.trim().is_empty() => PollStatus::Ready(url),
                _ => PollStatus::Failed("completed without a video URL".to_string()),
            },
            "failed" => PollStatus::Failed(
                data.error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "provider reported failure".to_string()),
            ),
            _ => PollStatus::Pending,
        })
    }
}

// ── URL probe ────────────────────────────────────────────────────────

pub struct HttpUrlProbe {
    http: Client,
}

impl HttpUrlProbe {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl UrlProbe for HttpUrlProbe {
    async fn exists(&self, url: &str) -> Result<bool, PipelineError> {
        let head = self.http.head(url).send().await?;
        let status = head.status();
        if status.is_success() {
            return Ok(true);
        }

        // Some CDNs refuse HEAD; ask for a single byte instead.
        if status == reqwest::StatusCode::METHOD_NOT_ALLOWED || status == reqwest::StatusCode::FORBIDDEN {
            let ranged = self
                .http
                .get(url)
                .header(reqwest::header::RANGE, "bytes=0-0")
                .send()
                .await?;
            return Ok(ranged.status().is_success());
        }

        if status.is_server_error() {
            return Err(PipelineError::transient(format!("Probe of {} returned {}", url, status)));
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_script_untouched() {
        assert_eq!(fit_script_to_duration("Buy  this mug.", 30), "Buy this mug.");
    }

    #[test]
    fn test_long_script_cut_at_sentence() {
        let script = "One two three four. Five six seven eight nine ten eleven twelve.";
        // 2 seconds → 5 words: "One two three four. Five" → back up to the first sentence
        assert_eq!(fit_script_to_duration(script, 2), "One two three four.");
    }

    #[test]
    fn test_long_script_without_sentence_end() {
        let script = "alpha beta gamma delta epsilon zeta eta theta";
        assert_eq!(fit_script_to_duration(script, 2), "alpha beta gamma delta epsilon.");
    }
}
