//! In-memory connector store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ConnectorStore, StoreError};
use crate::connector::ConnectorDescriptor;

/// Connector records held in memory, listed in id order.
#[derive(Debug, Default)]
pub struct InMemoryConnectorStore {
    connectors: RwLock<BTreeMap<String, ConnectorDescriptor>>,
}

impl InMemoryConnectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectorStore for InMemoryConnectorStore {
    async fn get(&self, id: &str) -> Result<Option<ConnectorDescriptor>, StoreError> {
        Ok(self.connectors.read().await.get(id).cloned())
    }

    async fn insert(&self, connector: ConnectorDescriptor) -> Result<(), StoreError> {
        self.connectors
            .write()
            .await
            .insert(connector.id.clone(), connector);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<Option<ConnectorDescriptor>, StoreError> {
        Ok(self.connectors.write().await.remove(id))
    }

    async fn list(&self) -> Result<Vec<ConnectorDescriptor>, StoreError> {
        Ok(self.connectors.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::ConnectorStatus;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_get_and_status_update() {
        let store = InMemoryConnectorStore::new();
        let connector = ConnectorDescriptor::from_document(
            "petstore",
            "demo-user",
            json!({"info": {"title": "Pet Store API"}}),
        );
        store.insert(connector).await.unwrap();

        let fetched = store.get("petstore").await.unwrap().unwrap();
        assert_eq!(fetched.status, ConnectorStatus::PendingCredentials);

        store.set_status("petstore", ConnectorStatus::Active).await.unwrap();
        assert!(store.get("petstore").await.unwrap().unwrap().is_active());

        assert!(matches!(
            store.set_status("missing", ConnectorStatus::Active).await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(store.remove("petstore").await.unwrap().is_some());
        assert!(store.get("petstore").await.unwrap().is_none());
    }
}
