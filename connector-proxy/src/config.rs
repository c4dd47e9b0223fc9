//! TOML configuration for the proxy binary.
//!
//! ```toml
//! user_id = "demo-user"
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-4o"
//!
//! [matching]
//! top_k = 3
//!
//! [http]
//! timeout_secs = 30
//!
//! [secrets]
//! dir = ".connector-proxy/secrets"
//!
//! [[connectors]]
//! id = "petstore"
//! document = "petstore.yaml"
//!
//! [connectors.credentials]
//! api_key = "..."
//! ```
//!
//! Relative paths are resolved against the directory of the config file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::connector::{ConnectorDescriptor, ConnectorStatus};
use crate::executor::DEFAULT_TIMEOUT;
use crate::llm::LlmSettings;
use crate::pipeline::DEFAULT_TOP_K;
use crate::types::Credentials;

pub const DEFAULT_USER_ID: &str = "demo-user";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid API description {path}: {message}")]
    Document { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

fn default_http_timeout() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretsSettings {
    /// Root of the file secret store; in-memory when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// One `[[connectors]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorEntry {
    pub id: String,
    /// JSON or YAML API description
    pub document: PathBuf,
    #[serde(default)]
    pub status: Option<ConnectorStatus>,
    /// Owner; the top-level `user_id` when unset
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub secrets: SecretsSettings,
    #[serde(default)]
    pub connectors: Vec<ConnectorEntry>,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            llm: LlmSettings::default(),
            matching: MatchingSettings::default(),
            http: HttpSettings::default(),
            secrets: SecretsSettings::default(),
            connectors: Vec::new(),
            base_dir: None,
        }
    }
}

/// A configured connector ready for registration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConnector {
    pub descriptor: ConnectorDescriptor,
    pub credentials: Option<Credentials>,
}

impl ProxyConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ProxyConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::Invalid("user_id must not be empty".to_string()));
        }
        if self.http.timeout_secs == 0 || self.llm.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &self.connectors {
            if !seen.insert(entry.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate connector id '{}'",
                    entry.id
                )));
            }
        }
        Ok(())
    }

    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn secrets_dir(&self) -> Option<PathBuf> {
        self.secrets.dir.as_deref().map(|d| self.resolve_path(d))
    }

    /// Read every configured connector document.
    pub fn load_connectors(&self) -> Result<Vec<LoadedConnector>, ConfigError> {
        self.connectors
            .iter()
            .map(|entry| {
                let document = load_document(&self.resolve_path(&entry.document))?;
                let owner = entry.user_id.clone().unwrap_or_else(|| self.user_id.clone());
                let mut descriptor = ConnectorDescriptor::from_document(&entry.id, owner, document);
                if let Some(status) = entry.status {
                    descriptor = descriptor.with_status(status);
                }
                Ok(LoadedConnector {
                    descriptor,
                    credentials: entry.credentials.clone(),
                })
            })
            .collect()
    }
}

/// Parse an API description; `.yaml`/`.yml` as YAML, anything else as JSON.
pub fn load_document(path: &Path) -> Result<Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let parsed: Result<Value, String> = if is_yaml {
        // Through serde_yaml::Value so unquoted status-code keys become strings.
        serde_yaml::from_str::<serde_yaml::Value>(&content)
            .map_err(|e| e.to_string())
            .and_then(|yaml| serde_json::to_value(yaml).map_err(|e| e.to_string()))
    } else {
        serde_json::from_str(&content).map_err(|e| e.to_string())
    };
    let document = parsed.map_err(|message| ConfigError::Document {
        path: path.to_path_buf(),
        message,
    })?;

    if !document.is_object() {
        return Err(ConfigError::Document {
            path: path.to_path_buf(),
            message: "document root must be an object".to_string(),
        });
    }
    Ok(document)
}
