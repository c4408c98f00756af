//! Social platform adapters.
//!
//! Each adapter wraps one platform's HTTP API behind [`PlatformPoster`].
//! Adapters only make the call and classify the response; retry, rate
//! limiting and aggregation live in the posting orchestrator.

pub mod facebook;
pub mod instagram;
pub mod linkedin;
pub mod x;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::{AppConfig, PlatformCredentials, PlatformSettings};
use crate::error::{check_response, PipelineError};
use crate::models::post::{Platform, PostMode};
use crate::services::clock::Clock;

pub use facebook::FacebookPoster;
pub use instagram::InstagramPoster;
pub use linkedin::LinkedInPoster;
pub use x::XPoster;

#[async_trait]
pub trait PlatformPoster: Send + Sync {
    fn platform(&self) -> Platform;

    fn mode(&self) -> PostMode;

    /// Publish the video (or a link to it) and return the platform's post id.
    async fn post(&self, video_url: &str, caption: &str) -> Result<String, PipelineError>;
}

/// One adapter per platform that has credentials.
pub fn build_posters(
    settings: &PlatformSettings,
    http: &Client,
    clock: Arc<dyn Clock>,
    config: &AppConfig,
) -> Vec<Arc<dyn PlatformPoster>> {
    settings
        .enabled
        .iter()
        .map(|credentials| -> Arc<dyn PlatformPoster> {
            match credentials {
                PlatformCredentials::Facebook { page_id, page_token } => Arc::new(FacebookPoster::new(
                    http.clone(),
                    &config.graph_base_url,
                    page_id,
                    page_token,
                )),
                PlatformCredentials::Instagram { user_id, access_token } => Arc::new(InstagramPoster::new(
                    http.clone(),
                    &config.graph_base_url,
                    user_id,
                    access_token,
                    clock.clone(),
                )),
                PlatformCredentials::X { access_token } => {
                    Arc::new(XPoster::new(http.clone(), &config.x_base_url, access_token))
                }
                PlatformCredentials::LinkedIn { access_token, author_urn } => Arc::new(LinkedInPoster::new(
                    http.clone(),
                    &config.linkedin_base_url,
                    access_token,
                    author_urn,
                )),
            }
        })
        .collect()
}

// ── Graph API helpers (Facebook, Instagram) ──────────────────────────

#[derive(Deserialize)]
struct GraphErrorEnvelope {
    error: GraphError,
}

#[derive(Deserialize)]
struct GraphError {
    message: String,
    code: Option<i64>,
}

/// Graph reports throttling and token problems as 400s with an error code.
pub(crate) async fn check_graph_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, PipelineError> {
    match check_response(response).await {
        Ok(response) => Ok(response),
        Err(PipelineError::Validation(message)) => Err(reclassify_graph_error(message)),
        Err(other) => Err(other),
    }
}

fn reclassify_graph_error(message: String) -> PipelineError {
    let body = message.split_once(": ").map(|(_, b)| b).unwrap_or(&message);
    let Ok(envelope) = serde_json::from_str::<GraphErrorEnvelope>(body) else {
        return PipelineError::Validation(message);
    };
    match envelope.error.code {
        // Temporary issue, unknown error, and the app/user/page rate limits
        Some(1 | 2 | 4 | 17 | 32 | 341 | 613) => PipelineError::transient(envelope.error.message),
        // Expired or invalid access token
        Some(102 | 190) => PipelineError::Auth(envelope.error.message),
        _ => PipelineError::Validation(message),
    }
}

#[derive(Deserialize)]
pub(crate) struct GraphId {
    pub id: String,
}
