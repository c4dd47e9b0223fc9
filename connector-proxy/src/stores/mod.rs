//! Connector and secret stores.
//!
//! Both are external collaborators of the pipeline, injected as
//! `Arc<dyn ...>` handles. The implementations here back the binary and
//! the tests.

pub mod connectors;
pub mod secrets;

pub use connectors::InMemoryConnectorStore;
pub use secrets::{FileSecretStore, InMemorySecretStore};

use async_trait::async_trait;
use thiserror::Error;

use crate::connector::{ConnectorDescriptor, ConnectorStatus};
use crate::types::Credentials;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connector '{0}' not found")]
    NotFound(String),

    #[error("Invalid store key '{0}'")]
    InvalidKey(String),

    #[error("Store I/O error: {0}")]
    Io(String),

    #[error("Store serialization error: {0}")]
    Serialization(String),
}

#[async_trait]
pub trait ConnectorStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<ConnectorDescriptor>, StoreError>;

    /// Insert or replace a connector record.
    async fn insert(&self, connector: ConnectorDescriptor) -> Result<(), StoreError>;

    async fn remove(&self, id: &str) -> Result<Option<ConnectorDescriptor>, StoreError>;

    async fn list(&self) -> Result<Vec<ConnectorDescriptor>, StoreError>;

    async fn set_status(&self, id: &str, status: ConnectorStatus) -> Result<(), StoreError> {
        let connector = self
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.insert(connector.with_status(status)).await
    }
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Credentials for a (user, connector) pair; empty when none are stored.
    async fn get(&self, user_id: &str, connector_id: &str) -> Credentials;

    async fn store(
        &self,
        user_id: &str,
        connector_id: &str,
        credentials: Credentials,
    ) -> Result<(), StoreError>;

    /// Returns whether anything was removed.
    async fn delete(&self, user_id: &str, connector_id: &str) -> Result<bool, StoreError>;
}
