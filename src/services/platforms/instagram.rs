use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{check_graph_response, GraphId, PlatformPoster};
use crate::error::PipelineError;
use crate::models::post::{Platform, PostMode};
use crate::services::clock::Clock;

const CONTAINER_CHECK_INTERVAL: Duration = Duration::from_secs(5);
const CONTAINER_MAX_CHECKS: u32 = 24;

/// Instagram Reels via the Graph content publishing flow:
/// create a container, wait for it to finish processing, publish it.
pub struct InstagramPoster {
    http: Client,
    base_url: String,
    user_id: String,
    access_token: String,
    clock: Arc<dyn Clock>,
    check_interval: Duration,
    max_checks: u32,
}

#[derive(Deserialize)]
struct ContainerStatus {
    status_code: Option<String>,
    status: Option<String>,
}

impl InstagramPoster {
    pub fn new(
        http: Client,
        base_url: &str,
        user_id: &str,
        access_token: &str,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
            access_token: access_token.to_string(),
            clock,
            check_interval: CONTAINER_CHECK_INTERVAL,
            max_checks: CONTAINER_MAX_CHECKS,
        }
    }

    pub fn with_container_checks(mut self, interval: Duration, max_checks: u32) -> Self {
        self.check_interval = interval;
        self.max_checks = max_checks.max(1);
        self
    }

    async fn create_container(&self, video_url: &str, caption: &str) -> Result<String, PipelineError> {
        let response = self
            .http
            .post(format!("{}/{}/media", self.base_url, self.user_id))
            .form(&[
                ("media_type", "REELS"),
                ("video_url", video_url),
                ("caption", caption),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .await?;
        let response = check_graph_response(response).await?;
        let container: GraphId = response.json().await?;
        Ok(container.id)
    }

    async fn wait_until_finished(&self, container_id: &str) -> Result<(), PipelineError> {
        for check in 1..=self.max_checks {
            let response = self
                .http
                .get(format!("{}/{}", self.base_url, container_id))
                .query(&[
                    ("fields", "status_code,status"),
                    ("access_token", self.access_token.as_str()),
                ])
                .send()
                .await?;
            let response = check_graph_response(response).await?;
            let status: ContainerStatus = response.json().await?;

            match status.status_code.as_deref() {
                Some("FINISHED") => return Ok(()),
                Some("ERROR") | Some("EXPIRED") => {
                    return Err(PipelineError::Validation(format!(
                        "Reels container {} rejected: {}",
                        container_id,
                        status.status.unwrap_or_else(|| "no detail".to_string())
                    )))
                }
                other => {
                    debug!(container_id, check, status = ?other, "Reels container still processing");
                }
            }
            self.clock.sleep(self.check_interval).await;
        }

        // A container that is still processing may finish before the next attempt.
        Err(PipelineError::transient(format!(
            "Reels container {} not ready after {} checks",
            container_id, self.max_checks
        )))
    }

    async fn publish(&self, container_id: &str) -> Result<String, PipelineError> {
        let response = self
            .http
            .post(format!("{}/{}/media_publish", self.base_url, self.user_id))
            .form(&[
                ("creation_id", container_id),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .await?;
        let response = check_graph_response(response).await?;
        let media: GraphId = response.json().await?;
        Ok(media.id)
    }
}

#[async_trait]
impl PlatformPoster for InstagramPoster {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn mode(&self) -> PostMode {
        PostMode::Native
    }

    async fn post(&self, video_url: &str, caption: &str) -> Result<String, PipelineError> {
        let container_id = self.create_container(video_url, caption).await?;
        self.wait_until_finished(&container_id).await?;
        self.publish(&container_id).await
    }
}
