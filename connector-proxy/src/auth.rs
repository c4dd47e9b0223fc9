//! Outbound auth headers from a connector's security scheme and stored credentials.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::connector::{ConnectorDescriptor, SecurityScheme};
use crate::types::Credentials;

/// Credential entry holding the connector's API key.
pub const API_KEY_CREDENTIAL: &str = "api_key";
pub const DEFAULT_AUTH_HEADER: &str = "Authorization";

/// Declared auth mode of a connector (`x-auth-type`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    ApiKey,
    None,
    Unsupported(String),
}

impl AuthMode {
    pub fn parse(mode: &str) -> Self {
        match mode.trim().to_ascii_lowercase().as_str() {
            "api-key" | "api_key" | "apikey" => AuthMode::ApiKey,
            "none" => AuthMode::None,
            other => AuthMode::Unsupported(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthResolver;

impl AuthResolver {
    pub fn new() -> Self {
        Self
    }

    /// Headers to attach to a call against `connector`.
    ///
    /// `Content-Type: application/json` is always present. A missing key
    /// leaves the call unauthenticated.
    pub fn resolve_headers(
        &self,
        connector: &ConnectorDescriptor,
        credentials: &Credentials,
    ) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        match AuthMode::parse(connector.auth_mode()) {
            AuthMode::ApiKey => {
                let key = credentials
                    .get(API_KEY_CREDENTIAL)
                    .map(|k| k.trim())
                    .filter(|k| !k.is_empty());
                match key {
                    Some(key) => {
                        if let Some((name, value)) =
                            api_key_header(connector.security_scheme().as_ref(), key)
                        {
                            debug!("attaching '{}' auth header for '{}'", name, connector.id);
                            headers.insert(name, value);
                        }
                    }
                    None => debug!(
                        "no '{}' credential for '{}'; calling unauthenticated",
                        API_KEY_CREDENTIAL, connector.id
                    ),
                }
            }
            AuthMode::None => {}
            AuthMode::Unsupported(mode) => {
                warn!("auth mode '{}' of '{}' is not supported; no auth header", mode, connector.id)
            }
        }
        headers
    }
}

/// Header for an API key under the declared scheme, if the scheme is header-based.
pub fn api_key_header(scheme: Option<&SecurityScheme>, key: &str) -> Option<(String, String)> {
    let Some(scheme) = scheme else {
        return Some((DEFAULT_AUTH_HEADER.to_string(), bearer(key)));
    };

    if scheme
        .location
        .as_deref()
        .is_some_and(|l| l.eq_ignore_ascii_case("header"))
    {
        let name = scheme
            .parameter_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AUTH_HEADER.to_string());
        let value = if name.to_ascii_lowercase().contains("authorization") {
            bearer(key)
        } else {
            key.to_string()
        };
        return Some((name, value));
    }

    if scheme.scheme_type.eq_ignore_ascii_case("http")
        && scheme
            .http_scheme
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("bearer"))
    {
        return Some((DEFAULT_AUTH_HEADER.to_string(), bearer(key)));
    }

    debug!(
        "security scheme '{}' ({}) is not header-based; no auth header",
        scheme.key, scheme.scheme_type
    );
    None
}

fn bearer(key: &str) -> String {
    if key.to_ascii_lowercase().starts_with("bearer ") {
        key.to_string()
    } else {
        format!("Bearer {}", key)
    }
}
