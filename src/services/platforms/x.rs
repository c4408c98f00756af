use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::PlatformPoster;
use crate::error::{check_response, PipelineError};
use crate::models::post::{Platform, PostMode};

const MAX_POST_CHARS: usize = 280;
/// X shortens every link to a t.co URL of this length.
const LINK_CHARS: usize = 23;

/// Text post with a link to the hosted video.
pub struct XPoster {
    http: Client,
    base_url: String,
    access_token: String,
}

#[derive(Deserialize)]
struct CreateTweetResponse {
    data: CreatedTweet,
}

#[derive(Deserialize)]
struct CreatedTweet {
    id: String,
}

impl XPoster {
    pub fn new(http: Client, base_url: &str, access_token: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }
}

/// Caption followed by the link, shortening the caption to fit the character limit.
pub fn compose_post(caption: &str, video_url: &str) -> String {
    let caption = caption.trim();
    let budget = MAX_POST_CHARS - LINK_CHARS - 1;
    if caption.is_empty() {
        return video_url.to_string();
    }
    if caption.chars().count() <= budget {
        return format!("{} {}", caption, video_url);
    }

    let mut cut: String = caption.chars().take(budget - 1).collect();
    if let Some(space) = cut.rfind(char::is_whitespace) {
        cut.truncate(space);
    }
    format!("{}… {}", cut.trim_end(), video_url)
}

#[async_trait]
impl PlatformPoster for XPoster {
    fn platform(&self) -> Platform {
        Platform::X
    }

    fn mode(&self) -> PostMode {
        PostMode::LinkOnly
    }

    async fn post(&self, video_url: &str, caption: &str) -> Result<String, PipelineError> {
        let response = self
            .http
            .post(format!("{}/2/tweets", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "text": compose_post(caption, video_url) }))
            .send()
            .await?;
        let response = check_response(response).await?;

        let created: CreateTweetResponse = response.json().await?;
        Ok(created.data.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_caption_kept() {
        assert_eq!(
            compose_post("New mug!", "https://cdn/v.mp4"),
            "New mug! https://cdn/v.mp4"
        );
    }

    #[test]
    fn test_long_caption_shortened_on_word_boundary() {
        let caption = "word ".repeat(100);
        let text = compose_post(&caption, "https://cdn/v.mp4");
        let (body, link) = text.rsplit_once(' ').unwrap();
        assert_eq!(link, "https://cdn/v.mp4");
        assert!(body.ends_with("word…"));
        assert!(body.chars().count() + 1 + LINK_CHARS <= MAX_POST_CHARS);
    }

    #[test]
    fn test_empty_caption_is_just_the_link() {
        assert_eq!(compose_post("  ", "https://cdn/v.mp4"), "https://cdn/v.mp4");
    }
}
