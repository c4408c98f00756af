use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{check_response, PipelineError};

/// Product text handed to script generation.
#[derive(Debug, Clone, Default)]
pub struct ScriptInput {
    pub job_id: String,
    pub title: String,
    pub details: String,
    pub target_duration_secs: u32,
}

/// Marketing-script generation capability.
#[async_trait]
pub trait ScriptProvider: Send + Sync {
    async fn generate_script(&self, input: &ScriptInput) -> Result<String, PipelineError>;
}

/// Script built from the row's own text when no provider is available or it fails.
pub fn fallback_script(input: &ScriptInput) -> String {
    let title = input.title.trim();
    let details = input.details.trim();
    match (title.is_empty(), details.is_empty()) {
        (false, false) => format!("Meet {}. {}", title, details),
        (false, true) => format!("Meet {}.", title),
        (true, false) => details.to_string(),
        (true, true) => format!("Check out product {}.", input.job_id),
    }
}

/// Client for a Cloudflare Workers AI text model.
pub struct WorkersAiScriptClient {
    http: Client,
    base_url: String,
    account_id: String,
    api_token: String,
    model: String,
}

#[derive(Deserialize)]
struct TextGenerationResponse {
    result: TextGenerationResult,
}

#[derive(Deserialize)]
struct TextGenerationResult {
    response: String,
}

impl WorkersAiScriptClient {
    pub fn new(http: Client, base_url: &str, account_id: &str, api_token: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
            model: "@cf/meta/llama-3.1-8b-instruct".to_string(),
        }
    }

    fn prompt(input: &ScriptInput) -> String {
        format!(
            concat!(
                "Write a spoken script for a vertical social video about this product. ",
                "It must take about {} seconds to read aloud, use a friendly presenter voice, ",
                "end with a short call to action, and contain no hashtags, emojis or stage directions. ",
                "Return only the script text.\n\nProduct: {}\nDetails: {}"
            ),
            input.target_duration_secs, input.title, input.details
        )
    }
}

#[async_trait]
impl ScriptProvider for WorkersAiScriptClient {
    async fn generate_script(&self, input: &ScriptInput) -> Result<String, PipelineError> {
        let url = format!(
            "{}/accounts/{}/ai/run/{}",
            self.base_url, self.account_id, self.model
        );

        let request_body = serde_json::json!({
            "messages": [
                { "role": "system", "content": "You write concise product marketing scripts." },
                { "role": "user", "content": Self::prompt(input) }
            ],
            "max_tokens": 512
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&request_body)
            .send()
            .await?;
        let response = check_response(response).await?;

        let body: TextGenerationResponse = response.json().await?;
        let script = body.result.response.trim().trim_matches('"').trim().to_string();
        if script.is_empty() {
            return Err(PipelineError::transient("Workers AI returned an empty script"));
        }
        Ok(script)
    }
}
