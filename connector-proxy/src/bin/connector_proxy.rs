//! Connector Proxy CLI
//!
//! Loads a TOML configuration, registers the configured connectors into an
//! in-memory index and resolves free-text requests against them.
//!
//! Usage:
//!   connector-proxy --config proxy.toml query "Get pet with ID 5"
//!   connector-proxy --config proxy.toml query "Create a pet" -p name=Rex -p age=3
//!   connector-proxy --config proxy.toml match "Show me pet 123" --top-k 5
//!   connector-proxy --config proxy.toml operations

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use connector_proxy::config::ProxyConfig;
use connector_proxy::executor::RequestExecutor;
use connector_proxy::index::{InMemoryIndex, SemanticIndex};
use connector_proxy::llm::LanguageModel;
use connector_proxy::registry::ConnectorRegistry;
use connector_proxy::stores::{
    ConnectorStore, FileSecretStore, InMemoryConnectorStore, InMemorySecretStore, SecretStore,
};
use connector_proxy::types::{ArgValue, ArgumentMap};
use connector_proxy::{ConnectorProxy, ConnectorStatus, ResolveRequest};
use serde_json::json;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "connector-proxy")]
#[command(about = "Resolve free-text requests to connector API operations")]
struct Args {
    /// Path to the configuration file (TOML format)
    #[arg(long, env = "CONNECTOR_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Language model provider (openai, anthropic, google)
    #[arg(long, env = "CONNECTOR_PROXY_LLM_PROVIDER")]
    llm_provider: Option<String>,

    /// Language model name
    #[arg(long, env = "CONNECTOR_PROXY_LLM_MODEL")]
    llm_model: Option<String>,

    /// Language model API key
    #[arg(long, env = "CONNECTOR_PROXY_LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a request and execute the matched operation
    Query {
        text: String,
        /// Explicit argument as name=value; values are parsed as JSON when possible
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, ArgValue)>,
        /// User whose credentials are used (defaults to the connector owner)
        #[arg(long)]
        user: Option<String>,
    },
    /// Show candidates and the match assessment without executing
    Match {
        text: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// List registered connectors and their operations
    Operations,
}

fn parse_param(raw: &str) -> Result<(String, ArgValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing parameter name in '{}'", raw));
    }
    let value = serde_json::from_str::<serde_json::Value>(value)
        .map(ArgValue::from)
        .unwrap_or_else(|_| ArgValue::Text(value.to_string()));
    Ok((name.to_string(), value))
}

impl Args {
    fn load_config(&self) -> anyhow::Result<ProxyConfig> {
        let mut config = match &self.config {
            Some(path) => ProxyConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => ProxyConfig::default(),
        };
        if let Some(provider) = &self.llm_provider {
            config.llm.provider = Some(provider.clone());
        }
        if let Some(model) = &self.llm_model {
            config.llm.model = Some(model.clone());
        }
        if let Some(key) = &self.llm_api_key {
            config.llm.api_key = Some(key.clone());
        }
        Ok(config)
    }
}

struct Runtime {
    registry: ConnectorRegistry,
    proxy: ConnectorProxy,
}

async fn build_runtime(config: &ProxyConfig) -> anyhow::Result<Runtime> {
    let index: Arc<dyn SemanticIndex> = Arc::new(InMemoryIndex::new());
    let connectors: Arc<dyn ConnectorStore> = Arc::new(InMemoryConnectorStore::new());
    let secrets: Arc<dyn SecretStore> = match config.secrets_dir() {
        Some(dir) => Arc::new(FileSecretStore::new(dir)),
        None => Arc::new(InMemorySecretStore::new()),
    };
    let model = Arc::new(LanguageModel::from_settings(&config.llm));
    info!("language model: {}", model.name());

    let registry = ConnectorRegistry::new(connectors.clone(), secrets.clone(), index.clone());
    for loaded in config.load_connectors()? {
        let id = loaded.descriptor.id.clone();
        let owner = loaded.descriptor.user_id.clone();
        let explicit_status = config
            .connectors
            .iter()
            .any(|c| c.id == id && c.status.is_some());
        registry.register(loaded.descriptor).await?;

        // A configured status is kept as is; credentials are still stored.
        match loaded.credentials {
            Some(credentials) if explicit_status => {
                secrets.store(&owner, &id, credentials).await?;
            }
            Some(credentials) => registry.activate(&id, &owner, credentials).await?,
            None if !explicit_status => {
                if !secrets.get(&owner, &id).await.is_empty() {
                    connectors.set_status(&id, ConnectorStatus::Active).await?;
                }
            }
            None => {}
        }
    }

    let executor = RequestExecutor::new(Duration::from_secs(config.http.timeout_secs))?;
    let proxy = ConnectorProxy::new(connectors, secrets, index, model)?
        .with_top_k(config.matching.top_k)
        .with_executor(executor);
    Ok(Runtime { registry, proxy })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("connector_proxy=info".parse()?),
        )
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.load_config()?;
    let runtime = build_runtime(&config).await?;

    let output = match args.command {
        Command::Query { text, params, user } => {
            let parameters: ArgumentMap = params.into_iter().collect();
            let mut request = ResolveRequest::new(text).with_parameters(parameters);
            if let Some(user) = user {
                request = request.with_user(user);
            }
            let response = runtime.proxy.resolve_and_execute(request).await;
            serde_json::to_value(&response)?
        }
        Command::Match { text, top_k } => {
            let top_k = top_k.unwrap_or(runtime.proxy.top_k());
            let outcome = runtime.proxy.matcher().match_query(&text, top_k).await;
            let candidates: Vec<serde_json::Value> = outcome
                .candidates
                .iter()
                .map(|c| {
                    json!({
                        "operation": c.operation,
                        "similarity": c.similarity(),
                        "description": c.description,
                    })
                })
                .collect();
            json!({
                "assessment": outcome.assessment,
                "candidates": candidates,
            })
        }
        Command::Operations => {
            let connectors = runtime.registry.connectors().await?;
            let listing: Vec<serde_json::Value> = connectors
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "name": c.name,
                        "status": c.status,
                        "operations": c.operations().iter().map(|op| json!({
                            "operation_id": op.operation_id,
                            "method": op.method.to_uppercase(),
                            "path": op.path,
                            "summary": op.summary,
                        })).collect::<Vec<_>>(),
                    })
                })
                .collect();
            serde_json::Value::Array(listing)
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
