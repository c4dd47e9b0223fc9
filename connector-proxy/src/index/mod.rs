//! Semantic index over connector operations.
//!
//! The index is an external collaborator consumed through [`SemanticIndex`].
//! [`memory::InMemoryIndex`] is the reference implementation used by the
//! binary and the tests.

pub mod memory;

pub use memory::InMemoryIndex;

use async_trait::async_trait;
use thiserror::Error;

use crate::connector::ConnectorDescriptor;
use crate::types::{Candidate, OperationRef};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Index search failed: {0}")]
    Search(String),

    #[error("Index write failed: {0}")]
    Write(String),
}

/// One indexed operation document.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    /// `<connectorId>_<operationId>`
    pub id: String,
    pub text: String,
    pub operation: OperationRef,
}

impl IndexDocument {
    pub fn document_id(connector_id: &str, operation_id: &str) -> String {
        format!("{}_{}", connector_id, operation_id)
    }
}

#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Up to `top_k` candidates, ordered by ascending distance.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Candidate>, IndexError>;

    /// Insert or overwrite documents by id.
    async fn add(&self, documents: Vec<IndexDocument>) -> Result<(), IndexError>;

    /// Remove every document belonging to a connector; returns how many were removed.
    async fn delete_by_connector(&self, connector_id: &str) -> Result<usize, IndexError>;

    /// Replace a connector's documents.
    ///
    /// Implementations backed by a lock should perform this as a single write
    /// so readers never observe the intermediate state.
    async fn replace_connector(
        &self,
        connector_id: &str,
        documents: Vec<IndexDocument>,
    ) -> Result<(), IndexError> {
        self.delete_by_connector(connector_id).await?;
        self.add(documents).await
    }
}

/// Index documents for every catalogued operation of a connector.
pub fn documents_for_connector(connector: &ConnectorDescriptor) -> Vec<IndexDocument> {
    connector
        .operations()
        .into_iter()
        .map(|op| {
            let text = format!(
                "Connector: {}. Function: {}. Path: {} {}. Description: {} {}",
                connector.name,
                op.operation_id,
                op.method.to_uppercase(),
                op.path,
                op.summary,
                op.description
            );
            IndexDocument {
                id: IndexDocument::document_id(&connector.id, &op.operation_id),
                text: text.trim_end().to_string(),
                operation: op.operation_ref(&connector.id),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_documents_for_connector() {
        let connector = ConnectorDescriptor::from_document(
            "petstore",
            "demo-user",
            json!({
                "info": {"title": "Pet Store API"},
                "paths": {
                    "/pets/{petId}": {
                        "get": {"operationId": "getPetById", "summary": "Get a pet", "description": "by its id"}
                    }
                }
            }),
        );
        let docs = documents_for_connector(&connector);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "petstore_getPetById");
        assert_eq!(
            docs[0].text,
            "Connector: Pet Store API. Function: getPetById. Path: GET /pets/{petId}. Description: Get a pet by its id"
        );
        assert_eq!(docs[0].operation.method, "get");
    }
}
