//! Upstream request execution.
//!
//! Builds the target URL from the connector's base URL and the operation
//! path, attaches auth headers, performs exactly one HTTP call and
//! normalizes the outcome.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::{Client, Method, Url};
use serde_json::Value;
use tracing::{debug, info, warn};
use urlencoding::encode;

use crate::auth::AuthResolver;
use crate::connector::{ConnectorDescriptor, PATH_PLACEHOLDER};
use crate::error::{ProxyError, ProxyResult};
use crate::parsing::json_or_text;
use crate::types::{arguments_to_json, ArgumentMap, Credentials, ExecutionResult};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A 2xx upstream reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSuccess {
    pub data: Value,
    pub status_code: u16,
}

pub struct RequestExecutor {
    client: Client,
    /// Client without proxy, used for loopback hosts
    direct_client: Client,
    auth: AuthResolver,
    timeout: Duration,
}

impl RequestExecutor {
    pub fn new(timeout: Duration) -> ProxyResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        let direct_client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| ProxyError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            direct_client,
            auth: AuthResolver::new(),
            timeout,
        })
    }

    /// Execute and normalize into an [`ExecutionResult`].
    pub async fn execute(
        &self,
        connector: &ConnectorDescriptor,
        operation_id: &str,
        path: &str,
        method: &str,
        credentials: &Credentials,
        arguments: &ArgumentMap,
    ) -> ExecutionResult {
        match self
            .send(connector, operation_id, path, method, credentials, arguments)
            .await
        {
            Ok(success) => ExecutionResult::ok(success.data, success.status_code),
            Err(e) => ExecutionResult::failure(&e),
        }
    }

    pub async fn send(
        &self,
        connector: &ConnectorDescriptor,
        operation_id: &str,
        path: &str,
        method: &str,
        credentials: &Credentials,
        arguments: &ArgumentMap,
    ) -> ProxyResult<ExecutionSuccess> {
        let base_url = connector.base_url()?;
        let http_method = http_method(method)?;

        let (resolved_path, missing) = substitute_path(path, arguments);
        if !missing.is_empty() {
            warn!(
                "unresolved path placeholders for '{}': {}",
                operation_id,
                missing.join(", ")
            );
        }
        let mut url = build_url(&base_url, &resolved_path)?;

        if http_method == Method::GET || http_method == Method::DELETE {
            if let Some(operation) = connector.operation(path, method) {
                let pairs: Vec<(String, String)> = operation
                    .parameters_in("query")
                    .filter_map(|p| arguments.get(&p.name).map(|v| (p.name.clone(), v.to_string())))
                    .collect();
                if !pairs.is_empty() {
                    let mut query = url.query_pairs_mut();
                    for (k, v) in pairs {
                        query.append_pair(&k, &v);
                    }
                }
            }
        }

        let client = if url.host().map(is_loopback_host).unwrap_or(false) {
            &self.direct_client
        } else {
            &self.client
        };

        info!("executing {} {} ({})", http_method, url, operation_id);
        let mut request = client.request(http_method.clone(), url);
        for (name, value) in self.auth.resolve_headers(connector, credentials) {
            request = request.header(name, value);
        }
        if http_method == Method::POST || http_method == Method::PUT {
            request = request.json(&arguments_to_json(arguments));
        }

        let response = request.send().await.map_err(|e| self.network_error(e))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| self.network_error(e))?;
        let body = String::from_utf8_lossy(&bytes).to_string();
        debug!("upstream replied {} ({} bytes)", status, bytes.len());

        if !status.is_success() {
            return Err(ProxyError::UpstreamHttp {
                status: status.as_u16(),
                body,
            });
        }
        Ok(ExecutionSuccess {
            data: json_or_text(&body),
            status_code: status.as_u16(),
        })
    }

    fn network_error(&self, err: reqwest::Error) -> ProxyError {
        if err.is_timeout() {
            ProxyError::Network(format!(
                "Request timed out after {}s",
                self.timeout.as_secs()
            ))
        } else {
            ProxyError::Network(format!("Request failed: {}", err))
        }
    }
}

fn http_method(method: &str) -> ProxyResult<Method> {
    match method.to_ascii_lowercase().as_str() {
        "get" => Ok(Method::GET),
        "delete" => Ok(Method::DELETE),
        "post" => Ok(Method::POST),
        "put" => Ok(Method::PUT),
        _ => Err(ProxyError::UnsupportedMethod(method.to_uppercase())),
    }
}

/// Replace `{name}` placeholders with percent-encoded argument values.
///
/// Returns the new path and the names left unresolved.
pub fn substitute_path(path: &str, arguments: &ArgumentMap) -> (String, Vec<String>) {
    let mut missing = Vec::new();
    let resolved = PATH_PLACEHOLDER.replace_all(path, |caps: &regex::Captures| {
        let name = &caps[1];
        match arguments.get(name) {
            Some(value) => encode(&value.to_string()).into_owned(),
            None => {
                missing.push(name.to_string());
                caps[0].to_string()
            }
        }
    });
    (resolved.into_owned(), missing)
}

pub fn build_url(base_url: &str, path: &str) -> ProxyResult<Url> {
    let mut full = base_url.trim_end_matches('/').to_string();
    if !path.starts_with('/') {
        full.push('/');
    }
    full.push_str(path);
    Url::parse(&full)
        .map_err(|e| ProxyError::Configuration(format!("Invalid request URL '{}': {}", full, e)))
}

fn is_loopback_host(host: url::Host<&str>) -> bool {
    match host {
        url::Host::Domain(domain) => {
            domain.eq_ignore_ascii_case("localhost")
                || domain.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
        }
        url::Host::Ipv4(ip) => ip.is_loopback(),
        url::Host::Ipv6(ip) => ip.is_loopback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArgValue;

    #[test]
    fn test_substitute_path_exact() {
        let mut args = ArgumentMap::new();
        args.insert("petId".to_string(), ArgValue::Integer(5));
        assert_eq!(substitute_path("/pets/{petId}", &args), ("/pets/5".to_string(), vec![]));
    }

    #[test]
    fn test_substitute_path_encodes_and_reports_missing() {
        let mut args = ArgumentMap::new();
        args.insert("name".to_string(), ArgValue::Text("big dog/1".to_string()));
        let (path, missing) = substitute_path("/owners/{ownerId}/pets/{name}", &args);
        assert_eq!(path, "/owners/{ownerId}/pets/big%20dog%2F1");
        assert_eq!(missing, vec!["ownerId".to_string()]);
    }

    #[test]
    fn test_build_url_joins_slashes() {
        let url = build_url("https://api.example.com/v1/", "/pets/5").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/pets/5");
        let url = build_url("https://api.example.com", "pets").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/pets");
    }

    #[test]
    fn test_method_support() {
        assert_eq!(http_method("GET").unwrap(), Method::GET);
        assert_eq!(http_method("put").unwrap(), Method::PUT);
        assert!(matches!(http_method("patch"), Err(ProxyError::UnsupportedMethod(m)) if m == "PATCH"));
    }

    #[test]
    fn test_loopback_detection() {
        let url = Url::parse("http://127.0.0.1:8080/x").unwrap();
        assert!(url.host().map(is_loopback_host).unwrap_or(false));
        let url = Url::parse("http://localhost/x").unwrap();
        assert!(url.host().map(is_loopback_host).unwrap_or(false));
        let url = Url::parse("http://[::1]/x").unwrap();
        assert!(url.host().map(is_loopback_host).unwrap_or(false));
        let url = Url::parse("https://petstore.example.com").unwrap();
        assert!(!url.host().map(is_loopback_host).unwrap_or(false));
    }
}
