//! Connector lifecycle around the pipeline.
//!
//! Registering indexes a connector's operations, activation stores the
//! owner's credentials and flips the status, merging new operations
//! re-indexes, unregistering removes index entries, secrets and the record.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::connector::{ConnectorDescriptor, ConnectorStatus, CATALOGUED_METHODS};
use crate::index::{documents_for_connector, IndexError, SemanticIndex};
use crate::stores::{ConnectorStore, SecretStore, StoreError};
use crate::types::Credentials;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Connector '{0}' not found")]
    NotFound(String),

    #[error("Invalid function definition: {0}")]
    InvalidDefinition(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Outcome of merging operations into a connector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergeReport {
    pub paths_added: Vec<String>,
    /// `METHOD /path` entries that overwrote an existing operation
    pub conflicts: Vec<String>,
    pub operations_indexed: usize,
}

pub struct ConnectorRegistry {
    connectors: Arc<dyn ConnectorStore>,
    secrets: Arc<dyn SecretStore>,
    index: Arc<dyn SemanticIndex>,
}

impl ConnectorRegistry {
    pub fn new(
        connectors: Arc<dyn ConnectorStore>,
        secrets: Arc<dyn SecretStore>,
        index: Arc<dyn SemanticIndex>,
    ) -> Self {
        Self {
            connectors,
            secrets,
            index,
        }
    }

    /// Store a connector and index its operations. Returns the number indexed.
    pub async fn register(&self, connector: ConnectorDescriptor) -> Result<usize, RegistryError> {
        let documents = documents_for_connector(&connector);
        let count = documents.len();
        let id = connector.id.clone();
        self.connectors.insert(connector).await?;
        self.index.replace_connector(&id, documents).await?;
        info!("registered connector '{}' with {} operation(s)", id, count);
        Ok(count)
    }

    /// Store credentials for `user_id` and mark the connector active.
    pub async fn activate(
        &self,
        connector_id: &str,
        user_id: &str,
        credentials: Credentials,
    ) -> Result<(), RegistryError> {
        if self.connectors.get(connector_id).await?.is_none() {
            return Err(RegistryError::NotFound(connector_id.to_string()));
        }
        self.secrets.store(user_id, connector_id, credentials).await?;
        self.connectors
            .set_status(connector_id, ConnectorStatus::Active)
            .await?;
        info!("connector '{}' activated for user '{}'", connector_id, user_id);
        Ok(())
    }

    /// Merge a `paths` fragment into a connector's document and re-index it.
    ///
    /// Every operation must carry `operationId` and `responses`. The fragment
    /// is validated as a whole before anything is written.
    pub async fn merge_operations(
        &self,
        connector_id: &str,
        definition: Value,
    ) -> Result<MergeReport, RegistryError> {
        let connector = self
            .connectors
            .get(connector_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(connector_id.to_string()))?;
        let new_paths = validate_definition(definition)?;

        let mut document = connector.document.clone();
        if !document.get("paths").is_some_and(Value::is_object) {
            if let Some(root) = document.as_object_mut() {
                root.insert("paths".to_string(), Value::Object(Map::new()));
            }
        }
        let paths = document
            .get_mut("paths")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| RegistryError::InvalidDefinition("connector document is not an object".to_string()))?;

        let mut report = MergeReport::default();
        for (path, methods) in new_paths {
            let entry = paths
                .entry(path.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            let Some(existing) = entry.as_object_mut() else {
                return Err(RegistryError::InvalidDefinition(format!(
                    "existing path '{}' is not an object",
                    path
                )));
            };
            for (method, operation) in methods {
                if existing.contains_key(&method) {
                    report
                        .conflicts
                        .push(format!("{} {}", method.to_uppercase(), path));
                }
                existing.insert(method, operation);
            }
            report.paths_added.push(path);
        }

        let updated = ConnectorDescriptor {
            document,
            ..connector
        };
        let documents = documents_for_connector(&updated);
        report.operations_indexed = documents.len();
        self.connectors.insert(updated).await?;
        self.index.replace_connector(connector_id, documents).await?;

        if !report.conflicts.is_empty() {
            warn!(
                "merge into '{}' overwrote: {}",
                connector_id,
                report.conflicts.join(", ")
            );
        }
        info!(
            "merged {} path(s) into '{}'",
            report.paths_added.len(),
            connector_id
        );
        Ok(report)
    }

    /// Remove a connector with its index entries and its owner's secrets.
    pub async fn unregister(&self, connector_id: &str) -> Result<bool, RegistryError> {
        let Some(connector) = self.connectors.get(connector_id).await? else {
            return Ok(false);
        };
        let removed = self.index.delete_by_connector(connector_id).await?;
        self.secrets.delete(&connector.user_id, connector_id).await?;
        self.connectors.remove(connector_id).await?;
        info!(
            "unregistered connector '{}' ({} index entries removed)",
            connector_id, removed
        );
        Ok(true)
    }

    pub async fn connectors(&self) -> Result<Vec<ConnectorDescriptor>, RegistryError> {
        Ok(self.connectors.list().await?)
    }
}

fn validate_definition(definition: Value) -> Result<Vec<(String, Vec<(String, Value)>)>, RegistryError> {
    let Value::Object(paths) = definition else {
        return Err(RegistryError::InvalidDefinition(
            "definition must be an object with paths as keys".to_string(),
        ));
    };

    let mut validated = Vec::new();
    for (path, methods) in paths {
        let Value::Object(methods) = methods else {
            return Err(RegistryError::InvalidDefinition(format!(
                "path '{}' must contain HTTP methods",
                path
            )));
        };
        let mut operations = Vec::new();
        for (method, operation) in methods {
            let method = method.to_ascii_lowercase();
            if !CATALOGUED_METHODS.contains(&method.as_str()) {
                return Err(RegistryError::InvalidDefinition(format!(
                    "unsupported method '{}' on path '{}'",
                    method, path
                )));
            }
            for field in ["operationId", "responses"] {
                if operation.get(field).is_none() {
                    return Err(RegistryError::InvalidDefinition(format!(
                        "operation {} {} must have '{}'",
                        method.to_uppercase(),
                        path,
                        field
                    )));
                }
            }
            operations.push((method, operation));
        }
        validated.push((path, operations));
    }
    Ok(validated)
}
