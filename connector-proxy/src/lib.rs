// Connector Proxy Library
// Resolves free-text requests to a single operation of a registered API
// connector, extracts its arguments, authenticates and executes the call.

pub mod auth;
pub mod config;
pub mod connector;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod index;
pub mod llm;
pub mod matcher;
pub mod parsing;
pub mod pipeline;
pub mod registry;
pub mod stores;
pub mod tier;
pub mod types;

pub use crate::connector::{ConnectorDescriptor, ConnectorStatus, OperationSpec, ParameterSpec};
pub use crate::error::{ProxyError, ProxyResult};
pub use crate::pipeline::{ConnectorProxy, ResolutionResponse, ResolveRequest};
pub use crate::types::{ArgValue, ArgumentMap, Assessment, Candidate, Confidence, ExecutionResult};
