//! The resolution pipeline: match, extract, authenticate, execute.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::connector::OperationSpec;
use crate::error::{ProxyError, ProxyResult};
use crate::executor::{RequestExecutor, DEFAULT_TIMEOUT};
use crate::extractor::ParameterExtractor;
use crate::index::SemanticIndex;
use crate::llm::LanguageModel;
use crate::matcher::FunctionMatcher;
use crate::stores::{ConnectorStore, SecretStore};
use crate::types::{ArgumentMap, OperationRef};

pub const DEFAULT_TOP_K: usize = 3;

/// One free-text request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub query: String,
    /// Caller-supplied arguments; they override anything extracted
    #[serde(default)]
    pub parameters: ArgumentMap,
    /// Whose credentials to use; defaults to the connector owner
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ResolveRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_parameters(mut self, parameters: ArgumentMap) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedOperation {
    pub connector: String,
    pub operation: String,
    pub path: String,
    pub method: String,
}

impl From<&OperationRef> for MatchedOperation {
    fn from(op: &OperationRef) -> Self {
        Self {
            connector: op.connector_id.clone(),
            operation: op.operation_id.clone(),
            path: op.path.clone(),
            method: op.method.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResponse {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub error_kind: Option<String>,
    pub matched_operation: Option<MatchedOperation>,
}

impl ResolutionResponse {
    pub fn success(data: Value, matched: MatchedOperation) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            matched_operation: Some(matched),
        }
    }

    pub fn failure(error: &ProxyError, matched: Option<MatchedOperation>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            matched_operation: matched,
        }
    }
}

struct Failure {
    error: ProxyError,
    matched: Option<MatchedOperation>,
}

impl Failure {
    fn unmatched(error: ProxyError) -> Self {
        Self {
            error,
            matched: None,
        }
    }

    fn matched(error: ProxyError, matched: &MatchedOperation) -> Self {
        Self {
            error,
            matched: Some(matched.clone()),
        }
    }
}

pub struct ConnectorProxy {
    matcher: FunctionMatcher,
    extractor: ParameterExtractor,
    executor: RequestExecutor,
    connectors: Arc<dyn ConnectorStore>,
    secrets: Arc<dyn SecretStore>,
    top_k: usize,
}

impl ConnectorProxy {
    pub fn new(
        connectors: Arc<dyn ConnectorStore>,
        secrets: Arc<dyn SecretStore>,
        index: Arc<dyn SemanticIndex>,
        model: Arc<LanguageModel>,
    ) -> ProxyResult<Self> {
        Ok(Self {
            matcher: FunctionMatcher::new(index, model.clone()),
            extractor: ParameterExtractor::new(model),
            executor: RequestExecutor::new(DEFAULT_TIMEOUT)?,
            connectors,
            secrets,
            top_k: DEFAULT_TOP_K,
        })
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_executor(mut self, executor: RequestExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn matcher(&self) -> &FunctionMatcher {
        &self.matcher
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Resolve a request to one operation and execute it.
    ///
    /// Never fails: every outcome, including a panic inside the pipeline,
    /// is reported as a [`ResolutionResponse`].
    pub async fn resolve_and_execute(&self, request: ResolveRequest) -> ResolutionResponse {
        let span = info_span!("resolve", request_id = %Uuid::new_v4());
        let outcome = AssertUnwindSafe(self.resolve(&request).instrument(span.clone()))
            .catch_unwind()
            .await;

        let _entered = span.enter();
        match outcome {
            Ok(Ok((data, matched))) => {
                info!("resolved to {} {}", matched.method.to_uppercase(), matched.path);
                ResolutionResponse::success(data, matched)
            }
            Ok(Err(failure)) => {
                info!("resolution failed ({}): {}", failure.error.kind(), failure.error);
                ResolutionResponse::failure(&failure.error, failure.matched)
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unexpected fault".to_string());
                warn!("resolution panicked: {}", message);
                ResolutionResponse::failure(&ProxyError::Internal(message), None)
            }
        }
    }

    async fn resolve(&self, request: &ResolveRequest) -> Result<(Value, MatchedOperation), Failure> {
        info!("resolving query: {}", request.query);
        let outcome = self.matcher.match_query(&request.query, self.top_k).await;
        if outcome.candidates.is_empty() {
            return Err(Failure::unmatched(ProxyError::NoCandidateFound));
        }
        if !outcome.assessment.selected {
            return Err(Failure::unmatched(ProxyError::MatchRejected {
                reasoning: outcome.assessment.reasoning.clone(),
            }));
        }
        let candidate = outcome.selected().ok_or_else(|| {
            Failure::unmatched(ProxyError::Internal(
                "selected candidate index out of range".to_string(),
            ))
        })?;
        let matched = MatchedOperation::from(&candidate.operation);

        let connector = self
            .connectors
            .get(&matched.connector)
            .await
            .map_err(|e| Failure::matched(ProxyError::Internal(e.to_string()), &matched))?
            .ok_or_else(|| {
                Failure::matched(ProxyError::ConnectorNotFound(matched.connector.clone()), &matched)
            })?;
        if !connector.is_active() {
            return Err(Failure::matched(
                ProxyError::ConnectorInactive {
                    name: connector.name.clone(),
                    status: connector.status,
                },
                &matched,
            ));
        }

        let operation = connector
            .operation(&matched.path, &matched.method)
            .unwrap_or_else(|| OperationSpec {
                operation_id: matched.operation.clone(),
                path: matched.path.clone(),
                method: matched.method.clone(),
                summary: String::new(),
                description: String::new(),
                parameters: Vec::new(),
            });
        let extraction = self
            .extractor
            .extract(&request.query, &operation, &request.parameters)
            .await;
        info!(
            "extracted {} argument(s) via {}",
            extraction.arguments.len(),
            extraction.source.as_str()
        );

        let user_id = request.user_id.as_deref().unwrap_or(&connector.user_id);
        let credentials = self.secrets.get(user_id, &connector.id).await;

        let success = self
            .executor
            .send(
                &connector,
                &matched.operation,
                &matched.path,
                &matched.method,
                &credentials,
                &extraction.arguments,
            )
            .await
            .map_err(|e| Failure::matched(e, &matched))?;
        Ok((success.data, matched))
    }
}
