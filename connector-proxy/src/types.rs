//! Core value types shared by the pipeline stages.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProxyError;

/// Metadata identifying one indexed operation of a connector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationRef {
    pub connector_id: String,
    pub operation_id: String,
    pub path: String,
    pub method: String,
}

/// A ranked operation returned by semantic search for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub operation: OperationRef,
    /// Human-readable description of the operation (the indexed document)
    pub description: String,
    /// Dissimilarity reported by the index, in `[0, 2]` (0 = identical)
    pub distance: f64,
}

impl Candidate {
    pub fn similarity(&self) -> f64 {
        1.0 - self.distance
    }
}

/// Confidence tier attached to an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Parse a confidence label case-insensitively.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Confidence::None),
            "low" => Some(Confidence::Low),
            "medium" => Some(Confidence::Medium),
            "high" => Some(Confidence::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::None => "none",
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision of whether (and which) candidate genuinely answers a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub selected: bool,
    pub index: Option<usize>,
    pub confidence: Confidence,
    pub reasoning: String,
}

impl Assessment {
    pub fn select(index: usize, confidence: Confidence, reasoning: impl Into<String>) -> Self {
        Self {
            selected: true,
            index: Some(index),
            confidence,
            reasoning: reasoning.into(),
        }
    }

    pub fn reject(confidence: Confidence, reasoning: impl Into<String>) -> Self {
        Self {
            selected: false,
            index: None,
            confidence,
            reasoning: reasoning.into(),
        }
    }

    /// The selected candidate, if any and if the index is in range.
    pub fn selected_candidate<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        if !self.selected {
            return None;
        }
        self.index.and_then(|i| candidates.get(i))
    }
}

/// A typed argument value.
///
/// Extracted values are always one of the four scalar kinds. `Json` only
/// carries structured values supplied explicitly by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Json(serde_json::Value),
}

impl ArgValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ArgValue::Integer(i) => serde_json::Value::from(*i),
            ArgValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ArgValue::Boolean(b) => serde_json::Value::Bool(*b),
            ArgValue::Text(s) => serde_json::Value::String(s.clone()),
            ArgValue::Json(v) => v.clone(),
        }
    }
}

impl From<serde_json::Value> for ArgValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(b) => ArgValue::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ArgValue::Integer(i),
                None => n
                    .as_f64()
                    .map(ArgValue::Float)
                    .unwrap_or(ArgValue::Json(serde_json::Value::Number(n))),
            },
            serde_json::Value::String(s) => ArgValue::Text(s),
            other => ArgValue::Json(other),
        }
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Integer(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Text(value.to_string())
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Integer(i) => write!(f, "{}", i),
            ArgValue::Float(x) => write!(f, "{}", x),
            ArgValue::Boolean(b) => write!(f, "{}", b),
            ArgValue::Text(s) => f.write_str(s),
            ArgValue::Json(v) => write!(f, "{}", v),
        }
    }
}

/// Arguments for one execution, keyed by declared parameter name.
pub type ArgumentMap = BTreeMap<String, ArgValue>;

/// Build an [`ArgumentMap`] from a JSON object; non-object values yield an empty map.
pub fn arguments_from_json(value: serde_json::Value) -> ArgumentMap {
    match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (k, ArgValue::from(v)))
            .collect(),
        _ => ArgumentMap::new(),
    }
}

pub fn arguments_to_json(arguments: &ArgumentMap) -> serde_json::Value {
    serde_json::Value::Object(
        arguments
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Stored credentials for one (user, connector) pair.
pub type Credentials = std::collections::HashMap<String, String>;

/// Normalized outcome of one upstream call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub status_code: Option<u16>,
}

impl ExecutionResult {
    pub fn ok(data: serde_json::Value, status_code: u16) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            status_code: Some(status_code),
        }
    }

    pub fn failure(error: &ProxyError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            status_code: error.status_code(),
        }
    }
}
