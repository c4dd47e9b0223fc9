//! Connector descriptors and read-only views over their API description.
//!
//! A connector wraps an OpenAPI-style document. Everything the pipeline needs
//! (base URL, auth mode, security scheme, operation catalog) is read from the
//! document on demand; the descriptor itself is an immutable snapshot.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProxyError, ProxyResult};
use crate::types::OperationRef;

/// HTTP methods that are catalogued as operations.
pub const CATALOGUED_METHODS: [&str; 5] = ["get", "post", "put", "delete", "patch"];

/// Default auth mode when the document does not declare `x-auth-type`.
pub const DEFAULT_AUTH_MODE: &str = "api-key";

/// `{name}` placeholder in an operation path; group 1 is the name.
pub(crate) static PATH_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^}/]+)\}").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectorStatus {
    PendingCredentials,
    Active,
    Disabled,
}

impl ConnectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorStatus::PendingCredentials => "pending-credentials",
            ConnectorStatus::Active => "active",
            ConnectorStatus::Disabled => "disabled",
        }
    }
}

impl Default for ConnectorStatus {
    fn default() -> Self {
        ConnectorStatus::PendingCredentials
    }
}

impl fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered external API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorDescriptor {
    pub id: String,
    /// Owner of the connector; default user for credential lookups
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
    /// Full API description document
    pub document: Value,
    #[serde(default)]
    pub status: ConnectorStatus,
}

/// One declared parameter of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    /// Declared location (`path`, `query`, `header`, `cookie`)
    pub location: String,
    /// Declared `schema.type`, `string` when absent
    pub schema_type: String,
    pub description: String,
    pub required: bool,
}

impl ParameterSpec {
    /// Read a parameter declaration; entries without a name are skipped.
    pub fn from_json(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?.to_string();
        Some(Self {
            name,
            location: str_field(value, "in").unwrap_or_default(),
            schema_type: value
                .get("schema")
                .and_then(|s| s.get("type"))
                .and_then(|t| t.as_str())
                .unwrap_or("string")
                .to_string(),
            description: str_field(value, "description").unwrap_or_default(),
            required: value
                .get("required")
                .and_then(|r| r.as_bool())
                .unwrap_or(false),
        })
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.schema_type.as_str(), "integer" | "number")
    }
}

/// One path + method pair of a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    pub operation_id: String,
    pub path: String,
    /// Lowercase HTTP method
    pub method: String,
    pub summary: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
}

impl OperationSpec {
    pub fn operation_ref(&self, connector_id: &str) -> OperationRef {
        OperationRef {
            connector_id: connector_id.to_string(),
            operation_id: self.operation_id.clone(),
            path: self.path.clone(),
            method: self.method.clone(),
        }
    }

    /// Parameters declared with the given location.
    pub fn parameters_in<'a>(&'a self, location: &'a str) -> impl Iterator<Item = &'a ParameterSpec> {
        self.parameters
            .iter()
            .filter(move |p| p.location.eq_ignore_ascii_case(location))
    }
}

/// The connector's declared security scheme (first entry of
/// `components.securitySchemes`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityScheme {
    /// Key of the scheme in `securitySchemes`
    pub key: String,
    pub scheme_type: String,
    /// `in` of an apiKey scheme
    pub location: Option<String>,
    /// `name` of an apiKey scheme (header/query/cookie name)
    pub parameter_name: Option<String>,
    /// `scheme` of an http scheme (bearer, basic)
    pub http_scheme: Option<String>,
}

impl ConnectorDescriptor {
    /// Build a descriptor from a description document.
    ///
    /// New connectors start in `pending-credentials` until secrets are stored.
    pub fn from_document(id: impl Into<String>, user_id: impl Into<String>, document: Value) -> Self {
        let info = document.get("info");
        let name = info
            .and_then(|i| str_field(i, "title"))
            .unwrap_or_else(|| "Unnamed API".to_string());
        let description = info.and_then(|i| str_field(i, "description"));
        let version = info.and_then(|i| str_field(i, "version"));
        Self {
            id: id.into(),
            user_id: user_id.into(),
            name,
            description,
            version,
            document,
            status: ConnectorStatus::PendingCredentials,
        }
    }

    pub fn with_status(mut self, status: ConnectorStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == ConnectorStatus::Active
    }

    /// Declared auth mode (`x-auth-type`), `api-key` when unspecified.
    pub fn auth_mode(&self) -> &str {
        self.document
            .get("x-auth-type")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_AUTH_MODE)
    }

    /// First declared server URL, validated as an absolute http(s) URL.
    pub fn base_url(&self) -> ProxyResult<String> {
        let servers = self
            .document
            .get("servers")
            .and_then(|s| s.as_array())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ProxyError::Configuration(format!(
                    "No server URL defined in the API description for connector '{}'. \
                     Add a 'servers' section with a valid base URL.",
                    self.name
                ))
            })?;

        let base_url = servers[0]
            .get("url")
            .and_then(|u| u.as_str())
            .unwrap_or("")
            .trim();
        if base_url.is_empty() {
            return Err(ProxyError::Configuration(format!(
                "Server URL is empty in the API description for connector '{}'.",
                self.name
            )));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ProxyError::Configuration(format!(
                "Invalid server URL '{}' for connector '{}'. URL must start with 'http://' or 'https://'.",
                base_url, self.name
            )));
        }
        Ok(base_url.to_string())
    }

    /// First declared security scheme, in document order.
    pub fn security_scheme(&self) -> Option<SecurityScheme> {
        let schemes = self
            .document
            .get("components")
            .and_then(|c| c.get("securitySchemes"))
            .and_then(|s| s.as_object())?;
        let (key, def) = schemes.iter().next()?;
        Some(SecurityScheme {
            key: key.clone(),
            scheme_type: str_field(def, "type").unwrap_or_default(),
            location: str_field(def, "in"),
            parameter_name: str_field(def, "name"),
            http_scheme: str_field(def, "scheme"),
        })
    }

    /// The full operation catalog, in document order.
    pub fn operations(&self) -> Vec<OperationSpec> {
        let Some(paths) = self.document.get("paths").and_then(|p| p.as_object()) else {
            return Vec::new();
        };

        let mut operations = Vec::new();
        for (path, item) in paths {
            let Some(methods) = item.as_object() else {
                continue;
            };
            for (method, details) in methods {
                let method = method.to_ascii_lowercase();
                if !CATALOGUED_METHODS.contains(&method.as_str()) {
                    continue;
                }
                operations.push(build_operation(path, &method, item, details));
            }
        }
        operations
    }

    /// Look up the operation declared for `path` + `method`.
    pub fn operation(&self, path: &str, method: &str) -> Option<OperationSpec> {
        let item = self.document.get("paths")?.get(path)?;
        let method = method.to_ascii_lowercase();
        let details = item.as_object()?.iter().find_map(|(m, d)| {
            if m.eq_ignore_ascii_case(&method) {
                Some(d)
            } else {
                None
            }
        })?;
        Some(build_operation(path, &method, item, details))
    }
}

fn build_operation(path: &str, method: &str, item: &Value, details: &Value) -> OperationSpec {
    let operation_id =
        str_field(details, "operationId").unwrap_or_else(|| fallback_operation_id(method, path));

    // Path-item parameters apply to every method; operation-level ones override by name.
    let mut parameters: Vec<ParameterSpec> = item
        .get("parameters")
        .and_then(|p| p.as_array())
        .map(|list| list.iter().filter_map(ParameterSpec::from_json).collect())
        .unwrap_or_default();
    if let Some(list) = details.get("parameters").and_then(|p| p.as_array()) {
        for param in list.iter().filter_map(ParameterSpec::from_json) {
            match parameters.iter_mut().find(|p| p.name == param.name) {
                Some(existing) => *existing = param,
                None => parameters.push(param),
            }
        }
    }

    OperationSpec {
        operation_id,
        path: path.to_string(),
        method: method.to_string(),
        summary: str_field(details, "summary").unwrap_or_default(),
        description: str_field(details, "description").unwrap_or_default(),
        parameters,
    }
}

/// Operation id used when the document omits `operationId`.
pub fn fallback_operation_id(method: &str, path: &str) -> String {
    format!("{}_{}", method, path.replace('/', "_"))
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}
