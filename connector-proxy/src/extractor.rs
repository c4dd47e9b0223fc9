//! Parameter extraction from free text.
//!
//! Extraction only runs when the chosen path has `{placeholder}` tokens.
//! Declared parameters are filled by the model tier when available and by
//! the pattern tier otherwise. Explicit caller values always win.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::connector::{OperationSpec, ParameterSpec, PATH_PLACEHOLDER};
use crate::llm::LanguageModel;
use crate::parsing::parse_json_object;
use crate::tier::Tier;
use crate::types::{ArgValue, ArgumentMap};

static INTEGER_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+\b").unwrap());

/// Where the extracted arguments came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionSource {
    Explicit,
    Model,
    Pattern,
    Placeholder,
}

impl ExtractionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionSource::Explicit => "explicit",
            ExtractionSource::Model => "model",
            ExtractionSource::Pattern => "pattern",
            ExtractionSource::Placeholder => "placeholder",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub arguments: ArgumentMap,
    pub source: ExtractionSource,
    /// Set when extraction fell back to pattern matching; holds the reason
    pub degraded: Option<String>,
}

#[async_trait]
pub trait ExtractionTier: Send + Sync {
    fn name(&self) -> &str;

    fn source(&self) -> ExtractionSource;

    async fn extract(&self, query: &str, operation: &OperationSpec) -> Tier<ArgumentMap>;
}

pub struct ModelExtraction {
    model: Arc<LanguageModel>,
}

impl ModelExtraction {
    pub fn new(model: Arc<LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ExtractionTier for ModelExtraction {
    fn name(&self) -> &str {
        "model"
    }

    fn source(&self) -> ExtractionSource {
        ExtractionSource::Model
    }

    async fn extract(&self, query: &str, operation: &OperationSpec) -> Tier<ArgumentMap> {
        if !self.model.is_configured() {
            return Tier::Next("language model not configured".to_string());
        }
        let prompt = build_extraction_prompt(query, operation);
        match self.model.complete(&prompt).await {
            Ok(reply) => Tier::Decided(parse_extraction(&reply, &operation.parameters)),
            Err(e) => {
                warn!("{} extraction failed: {}", self.model.name(), e);
                Tier::Next(format!("model call failed: {}", e))
            }
        }
    }
}

/// Regex adjacency and last-number heuristics. Always decides.
pub struct PatternExtraction;

#[async_trait]
impl ExtractionTier for PatternExtraction {
    fn name(&self) -> &str {
        "pattern"
    }

    fn source(&self) -> ExtractionSource {
        ExtractionSource::Pattern
    }

    async fn extract(&self, query: &str, operation: &OperationSpec) -> Tier<ArgumentMap> {
        Tier::Decided(extract_by_pattern(query, &operation.parameters))
    }
}

pub struct ParameterExtractor {
    tiers: Vec<Box<dyn ExtractionTier>>,
}

impl ParameterExtractor {
    pub fn new(model: Arc<LanguageModel>) -> Self {
        Self::with_tiers(vec![
            Box::new(ModelExtraction::new(model)),
            Box::new(PatternExtraction),
        ])
    }

    pub fn with_tiers(tiers: Vec<Box<dyn ExtractionTier>>) -> Self {
        Self { tiers }
    }

    /// Build the argument map for `operation` from `query` and explicit values.
    pub async fn extract(
        &self,
        query: &str,
        operation: &OperationSpec,
        explicit: &ArgumentMap,
    ) -> Extraction {
        let placeholders = path_placeholders(&operation.path);
        if placeholders.is_empty() {
            return Extraction {
                arguments: explicit.clone(),
                source: ExtractionSource::Explicit,
                degraded: None,
            };
        }

        if operation.parameters.is_empty() {
            return fill_placeholders(query, &placeholders, explicit);
        }

        let mut last_reason: Option<String> = None;
        let mut decided: Option<(ArgumentMap, ExtractionSource)> = None;
        for tier in &self.tiers {
            match tier.extract(query, operation).await {
                Tier::Decided(arguments) => {
                    debug!(
                        "extraction decided by '{}' tier: {} value(s)",
                        tier.name(),
                        arguments.len()
                    );
                    decided = Some((arguments, tier.source()));
                    break;
                }
                Tier::Next(reason) => {
                    debug!("extraction tier '{}' passed: {}", tier.name(), reason);
                    last_reason = Some(reason);
                }
            }
        }
        let (mut arguments, source) = decided.unwrap_or_else(|| {
            (
                extract_by_pattern(query, &operation.parameters),
                ExtractionSource::Pattern,
            )
        });

        let degraded = if source == ExtractionSource::Pattern {
            let reason = last_reason.unwrap_or_else(|| "no model tier".to_string());
            warn!(
                "parameter extraction for '{}' degraded to pattern matching: {}",
                operation.operation_id, reason
            );
            Some(reason)
        } else {
            None
        };

        for (name, value) in explicit {
            arguments.insert(name.clone(), value.clone());
        }
        Extraction {
            arguments,
            source,
            degraded,
        }
    }
}

/// Names of `{placeholder}` tokens in a path, in order of appearance.
pub fn path_placeholders(path: &str) -> Vec<String> {
    PATH_PLACEHOLDER
        .captures_iter(path)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Without declarations every missing placeholder takes the last number in the query.
fn fill_placeholders(query: &str, placeholders: &[String], explicit: &ArgumentMap) -> Extraction {
    let mut arguments = explicit.clone();
    let mut filled = false;
    if let Some(number) = last_integer_literal(query) {
        for name in placeholders {
            if !arguments.contains_key(name) {
                arguments.insert(name.clone(), ArgValue::Text(number.clone()));
                filled = true;
            }
        }
    }
    Extraction {
        arguments,
        source: if filled {
            ExtractionSource::Placeholder
        } else {
            ExtractionSource::Explicit
        },
        degraded: None,
    }
}

pub fn build_extraction_prompt(query: &str, operation: &OperationSpec) -> String {
    let params: Vec<String> = operation
        .parameters
        .iter()
        .map(|p| {
            format!(
                "- {} ({}, {}): {} [{}]",
                p.name,
                p.location,
                p.schema_type,
                p.description,
                if p.required { "REQUIRED" } else { "OPTIONAL" }
            )
        })
        .collect();
    let purpose = [&operation.summary, &operation.description]
        .into_iter()
        .find(|s| !s.trim().is_empty())
        .map(|s| s.as_str())
        .unwrap_or("API call");

    format!(
        r#"Extract parameter values for an API call from a user request.

API operation: {purpose}

Parameters:
{params}

User request: "{query}"

Return a JSON object mapping parameter names to values.
- Include only parameters whose value you can confidently infer from the request.
- Use numbers for integer and number parameters, true/false for boolean ones, strings otherwise.
- Omit anything you cannot determine. Return ONLY the JSON object.

Example: {{"petId": 123, "status": "available"}}"#,
        purpose = purpose,
        params = params.join("\n"),
        query = query
    )
}

/// Parse a model extraction reply against the declared parameters.
///
/// Undeclared keys are ignored and values that fail coercion are dropped.
/// A reply that is not a JSON object yields no values.
pub fn parse_extraction(reply: &str, parameters: &[ParameterSpec]) -> ArgumentMap {
    let Some(values) = parse_json_object(reply) else {
        warn!("model extraction reply is not a JSON object");
        return ArgumentMap::new();
    };
    let mut arguments = ArgumentMap::new();
    for param in parameters {
        let Some(raw) = values.get(&param.name) else {
            continue;
        };
        match coerce(raw, &param.schema_type) {
            Some(value) => {
                arguments.insert(param.name.clone(), value);
            }
            None => debug!(
                "dropping '{}': cannot coerce {} to {}",
                param.name, raw, param.schema_type
            ),
        }
    }
    arguments
}

/// Adjacency (`name: value`, `name value`) then last-number heuristics.
///
/// The last-number rule only applies when the parameter name does not appear
/// next to a value. An adjacent value that fails coercion drops the parameter.
pub fn extract_by_pattern(query: &str, parameters: &[ParameterSpec]) -> ArgumentMap {
    let mut arguments = ArgumentMap::new();
    for param in parameters {
        let adjacent = Regex::new(&format!(r"(?i)\b{}[:\s]+(\w+)", regex::escape(&param.name)))
            .ok()
            .and_then(|re| re.captures(query))
            .and_then(|cap| cap.get(1).map(|m| m.as_str().to_string()));

        let value = match adjacent {
            Some(token) => coerce(&Value::String(token), &param.schema_type),
            None if param.is_numeric() => last_integer_literal(query).and_then(|n| {
                if param.schema_type == "integer" {
                    n.parse::<i64>().ok().map(ArgValue::Integer)
                } else {
                    n.parse::<f64>().ok().map(ArgValue::Float)
                }
            }),
            None => None,
        };
        match value {
            Some(value) => {
                arguments.insert(param.name.clone(), value);
            }
            None => debug!("no pattern value for '{}'", param.name),
        }
    }
    arguments
}

fn last_integer_literal(query: &str) -> Option<String> {
    INTEGER_LITERAL
        .find_iter(query)
        .last()
        .map(|m| m.as_str().to_string())
}

/// Coerce a raw value to a declared schema type.
pub fn coerce(value: &Value, schema_type: &str) -> Option<ArgValue> {
    match schema_type {
        "integer" => match value {
            Value::Number(n) => n.as_i64().map(ArgValue::Integer).or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| ArgValue::Integer(f as i64))
            }),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().map(ArgValue::Integer).or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| ArgValue::Integer(f as i64))
                })
            }
            _ => None,
        },
        "number" => match value {
            Value::Number(n) => n.as_f64().map(ArgValue::Float),
            Value::String(s) => s.trim().parse::<f64>().ok().map(ArgValue::Float),
            _ => None,
        },
        "boolean" => match value {
            Value::Bool(b) => Some(ArgValue::Boolean(*b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(ArgValue::Boolean(true)),
                "false" | "no" | "0" => Some(ArgValue::Boolean(false)),
                _ => None,
            },
            Value::Number(n) => match n.as_i64() {
                Some(1) => Some(ArgValue::Boolean(true)),
                Some(0) => Some(ArgValue::Boolean(false)),
                _ => None,
            },
            _ => None,
        },
        _ => match value {
            Value::Null => None,
            Value::String(s) => Some(ArgValue::Text(s.clone())),
            other => Some(ArgValue::Text(other.to_string())),
        },
    }
}
