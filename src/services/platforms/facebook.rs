use async_trait::async_trait;
use reqwest::Client;

use super::{check_graph_response, GraphId, PlatformPoster};
use crate::error::PipelineError;
use crate::models::post::{Platform, PostMode};

/// Facebook Page video upload; Facebook fetches the file from `file_url` itself.
pub struct FacebookPoster {
    http: Client,
    base_url: String,
    page_id: String,
    page_token: String,
}

impl FacebookPoster {
    pub fn new(http: Client, base_url: &str, page_id: &str, page_token: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_id: page_id.to_string(),
            page_token: page_token.to_string(),
        }
    }
}

#[async_trait]
impl PlatformPoster for FacebookPoster {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn mode(&self) -> PostMode {
        PostMode::Native
    }

    async fn post(&self, video_url: &str, caption: &str) -> Result<String, PipelineError> {
        let response = self
            .http
            .post(format!("{}/{}/videos", self.base_url, self.page_id))
            .form(&[
                ("file_url", video_url),
                ("description", caption),
                ("access_token", self.page_token.as_str()),
            ])
            .send()
            .await?;
        let response = check_graph_response(response).await?;

        let created: GraphId = response.json().await?;
        Ok(created.id)
    }
}
