//! Language model providers.
//!
//! The set of backends is closed: [`LanguageModel`] has one variant per
//! supported provider plus `Disabled`. Callers treat a disabled model and a
//! failing model the same way (fall through to the next tier), so the only
//! thing they need is [`LanguageModel::complete`].

pub mod anthropic;
pub mod google;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use google::GoogleClient;
pub use openai::OpenAiClient;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_TOKENS: u32 = 200;
pub const DEFAULT_TEMPERATURE: f64 = 0.1;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("No language model configured")]
    NotConfigured,

    #[error("Model request failed: {0}")]
    Http(String),

    #[error("Model API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Model request timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    /// The request URL is dropped; it may carry the API key as a query parameter.
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Http(err.without_url().to_string())
        }
    }
}

/// `[llm]` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    /// `openai`, `anthropic` or `google`; anything else disables the model
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Override of the provider endpoint root
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            api_key: None,
            base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl LlmSettings {
    /// Configured key, or the provider's conventional environment variable.
    pub fn effective_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }
        let var = match self.provider.as_deref()?.to_ascii_lowercase().as_str() {
            "openai" => "OPENAI_API_KEY",
            "anthropic" => "ANTHROPIC_API_KEY",
            "google" | "gemini" => "GOOGLE_API_KEY",
            _ => return None,
        };
        std::env::var(var).ok()
    }
}

/// Settings shared by every provider client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Base URL without trailing slash, `default` when not overridden.
    pub fn endpoint_root(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, LlmError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))
    }
}

/// A configured language model, or none.
#[derive(Debug, Clone)]
pub enum LanguageModel {
    Disabled,
    OpenAi(OpenAiClient),
    Anthropic(AnthropicClient),
    Google(GoogleClient),
}

impl Default for LanguageModel {
    fn default() -> Self {
        LanguageModel::Disabled
    }
}

impl LanguageModel {
    /// Build the model from settings.
    ///
    /// An unknown provider, a missing or empty key, or a client that cannot
    /// be built all yield `Disabled`.
    pub fn from_settings(settings: &LlmSettings) -> Self {
        let Some(provider) = settings.provider.as_deref() else {
            debug!("no language model provider configured");
            return LanguageModel::Disabled;
        };
        let provider = provider.trim().to_ascii_lowercase();
        let default_model = match provider.as_str() {
            "openai" => openai::DEFAULT_MODEL,
            "anthropic" => anthropic::DEFAULT_MODEL,
            "google" | "gemini" => google::DEFAULT_MODEL,
            other => {
                warn!("unknown language model provider '{}', model disabled", other);
                return LanguageModel::Disabled;
            }
        };
        let api_key = match settings.effective_api_key() {
            Some(key) if !key.trim().is_empty() => key,
            _ => {
                warn!("no API key for provider '{}', model disabled", provider);
                return LanguageModel::Disabled;
            }
        };

        let config = ProviderConfig {
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            api_key,
            base_url: settings.base_url.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: Duration::from_secs(settings.timeout_secs),
        };

        let built = match provider.as_str() {
            "openai" => OpenAiClient::new(config).map(LanguageModel::OpenAi),
            "anthropic" => AnthropicClient::new(config).map(LanguageModel::Anthropic),
            _ => GoogleClient::new(config).map(LanguageModel::Google),
        };
        built.unwrap_or_else(|e| {
            warn!("failed to build {} client: {}", provider, e);
            LanguageModel::Disabled
        })
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, LanguageModel::Disabled)
    }

    pub fn name(&self) -> &'static str {
        match self {
            LanguageModel::Disabled => "disabled",
            LanguageModel::OpenAi(_) => "openai",
            LanguageModel::Anthropic(_) => "anthropic",
            LanguageModel::Google(_) => "google",
        }
    }

    /// Send one prompt and return the reply text.
    pub async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        match self {
            LanguageModel::Disabled => Err(LlmError::NotConfigured),
            LanguageModel::OpenAi(client) => client.complete(prompt).await,
            LanguageModel::Anthropic(client) => client.complete(prompt).await,
            LanguageModel::Google(client) => client.complete(prompt).await,
        }
    }
}

/// Read a status-checked JSON body, mapping non-2xx replies to [`LlmError::Status`].
pub(crate) async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Status {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| LlmError::InvalidResponse(e.to_string()))
}
