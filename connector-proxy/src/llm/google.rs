use reqwest::Client;
use tracing::debug;

use super::{read_json, LlmError, ProviderConfig};

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini `generateContent` client.
#[derive(Debug, Clone)]
pub struct GoogleClient {
    client: Client,
    config: ProviderConfig,
}

impl GoogleClient {
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: config.http_client()?,
            config,
        })
    }

    /// Model name as used in the URL (`models/` prefix removed).
    pub fn model_path(&self) -> &str {
        self.config
            .model
            .strip_prefix("models/")
            .unwrap_or(&self.config.model)
    }

    pub async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint_root(DEFAULT_BASE_URL),
            self.model_path()
        );
        let request_body = serde_json::json!({
            "contents": [{
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "maxOutputTokens": self.config.max_tokens
            }
        });

        debug!("google request: model={}", self.model_path());
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&request_body)
            .send()
            .await?;

        let response_json = read_json(response).await?;
        response_json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                LlmError::InvalidResponse("missing candidates[0].content.parts[0].text".to_string())
            })
    }
}
