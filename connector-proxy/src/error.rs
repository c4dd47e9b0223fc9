//! Error taxonomy for the resolution pipeline.
//!
//! Failures inside matching and extraction never surface here; they degrade
//! to the next tier and are only logged. What remains are the terminal
//! outcomes a caller can observe in a [`crate::pipeline::ResolutionResponse`].

use thiserror::Error;

use crate::connector::ConnectorStatus;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProxyError {
    #[error("No matching connector function found for this query")]
    NoCandidateFound,

    #[error("Connector '{0}' not found")]
    ConnectorNotFound(String),

    #[error("Connector '{name}' is not active ({status}). Please configure authentication secrets first.")]
    ConnectorInactive {
        name: String,
        status: ConnectorStatus,
    },

    #[error("No connector function genuinely matches this query: {reasoning}")]
    MatchRejected { reasoning: String },

    #[error("{0}")]
    Configuration(String),

    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("HTTP {status}: {body}")]
    UpstreamHttp { status: u16, body: String },

    #[error("{0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Stable snake_case name of the error kind, used in serialized responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::NoCandidateFound => "no_candidate_found",
            ProxyError::ConnectorNotFound(_) => "connector_not_found",
            ProxyError::ConnectorInactive { .. } => "connector_inactive",
            ProxyError::MatchRejected { .. } => "match_rejected",
            ProxyError::Configuration(_) => "configuration_error",
            ProxyError::UnsupportedMethod(_) => "unsupported_method",
            ProxyError::UpstreamHttp { .. } => "upstream_http_error",
            ProxyError::Network(_) => "network_error",
            ProxyError::Internal(_) => "internal_error",
        }
    }

    /// Upstream status code, only present for non-2xx responses.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProxyError::UpstreamHttp { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
