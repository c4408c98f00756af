use async_trait::async_trait;
use reqwest::Client;

use super::PlatformPoster;
use crate::error::{check_response, PipelineError};
use crate::models::post::{Platform, PostMode};

const LINKEDIN_VERSION: &str = "202405";

/// Member or organization share carrying the caption and a link to the video.
pub struct LinkedInPoster {
    http: Client,
    base_url: String,
    access_token: String,
    author_urn: String,
}

impl LinkedInPoster {
    pub fn new(http: Client, base_url: &str, access_token: &str, author_urn: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            author_urn: author_urn.to_string(),
        }
    }

    fn body(&self, video_url: &str, caption: &str) -> serde_json::Value {
        let commentary = match caption.trim() {
            "" => video_url.to_string(),
            text => format!("{}\n\n{}", text, video_url),
        };
        serde_json::json!({
            "author": self.author_urn,
            "commentary": commentary,
            "visibility": "PUBLIC",
            "distribution": {
                "feedDistribution": "MAIN_FEED",
                "targetEntities": [],
                "thirdPartyDistributionChannels": []
            },
            "lifecycleState": "PUBLISHED",
            "isReshareDisabledByAuthor": false
        })
    }
}

#[async_trait]
impl PlatformPoster for LinkedInPoster {
    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    fn mode(&self) -> PostMode {
        PostMode::LinkOnly
    }

    async fn post(&self, video_url: &str, caption: &str) -> Result<String, PipelineError> {
        let response = self
            .http
            .post(format!("{}/rest/posts", self.base_url))
            .bearer_auth(&self.access_token)
            .header("LinkedIn-Version", LINKEDIN_VERSION)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&self.body(video_url, caption))
            .send()
            .await?;
        let response = check_response(response).await?;

        // The new post's URN comes back in a header; the body is empty.
        Ok(response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string())
    }
}
