//! Secret stores keyed by (user, connector).
//!
//! The file store keeps one TOML file per pair under
//! `<root>/<user_id>/<connector_id>.toml`:
//!
//! ```toml
//! [secrets]
//! api_key = "..."
//! ```
//!
//! Missing or unreadable files read as "no credentials".

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::{SecretStore, StoreError};
use crate::types::Credentials;

#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<(String, String), Credentials>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, user_id: &str, connector_id: &str) -> Credentials {
        self.secrets
            .read()
            .await
            .get(&(user_id.to_string(), connector_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    async fn store(
        &self,
        user_id: &str,
        connector_id: &str,
        credentials: Credentials,
    ) -> Result<(), StoreError> {
        self.secrets
            .write()
            .await
            .insert((user_id.to_string(), connector_id.to_string()), credentials);
        Ok(())
    }

    async fn delete(&self, user_id: &str, connector_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .secrets
            .write()
            .await
            .remove(&(user_id.to_string(), connector_id.to_string()))
            .is_some())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SecretsFile {
    #[serde(default)]
    secrets: HashMap<String, String>,
}

/// TOML files under a root directory, owner-only on Unix.
#[derive(Debug)]
pub struct FileSecretStore {
    root: PathBuf,
    /// Serializes writers; readers go straight to disk
    write_lock: Mutex<()>,
}

impl FileSecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, user_id: &str, connector_id: &str) -> Result<PathBuf, StoreError> {
        for key in [user_id, connector_id] {
            if key.is_empty()
                || key == "."
                || key == ".."
                || key.contains(['/', '\\'])
            {
                return Err(StoreError::InvalidKey(key.to_string()));
            }
        }
        Ok(self.root.join(user_id).join(format!("{}.toml", connector_id)))
    }

    fn read_file(path: &Path) -> Credentials {
        if !path.exists() {
            return Credentials::new();
        }
        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| toml::from_str::<SecretsFile>(&content).map_err(|e| e.to_string()));
        match parsed {
            Ok(file) => file.secrets,
            Err(e) => {
                warn!("ignoring unreadable secrets file {}: {}", path.display(), e);
                Credentials::new()
            }
        }
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get(&self, user_id: &str, connector_id: &str) -> Credentials {
        match self.path_for(user_id, connector_id) {
            Ok(path) => Self::read_file(&path),
            Err(e) => {
                warn!("{}", e);
                Credentials::new()
            }
        }
    }

    async fn store(
        &self,
        user_id: &str,
        connector_id: &str,
        credentials: Credentials,
    ) -> Result<(), StoreError> {
        let path = self.path_for(user_id, connector_id)?;
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StoreError::Io(format!("Failed to create secrets directory: {}", e))
            })?;
        }

        let file = SecretsFile {
            secrets: credentials,
        };
        let content = toml::to_string_pretty(&file)
            .map_err(|e| StoreError::Serialization(format!("Failed to serialize secrets: {}", e)))?;
        fs::write(&path, &content)
            .map_err(|e| StoreError::Io(format!("Failed to write secrets file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms)
                .map_err(|e| StoreError::Io(format!("Failed to set file permissions: {}", e)))?;
        }

        debug!("stored secrets for {}/{}", user_id, connector_id);
        Ok(())
    }

    async fn delete(&self, user_id: &str, connector_id: &str) -> Result<bool, StoreError> {
        let path = self.path_for(user_id, connector_id)?;
        let _guard = self.write_lock.lock().await;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .map_err(|e| StoreError::Io(format!("Failed to remove secrets file: {}", e)))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn api_key(value: &str) -> Credentials {
        let mut credentials = Credentials::new();
        credentials.insert("api_key".to_string(), value.to_string());
        credentials
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileSecretStore::new(dir.path());

        assert!(store.get("alice", "petstore").await.is_empty());
        store.store("alice", "petstore", api_key("secret")).await.unwrap();
        assert_eq!(store.get("alice", "petstore").await, api_key("secret"));
        assert!(store.get("bob", "petstore").await.is_empty());

        assert!(store.delete("alice", "petstore").await.unwrap());
        assert!(!store.delete("alice", "petstore").await.unwrap());
        assert!(store.get("alice", "petstore").await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = FileSecretStore::new(dir.path());
        store.store("alice", "petstore", api_key("secret")).await.unwrap();

        let path = dir.path().join("alice").join("petstore.toml");
        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_unreadable_file_yields_empty() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("alice")).unwrap();
        fs::write(dir.path().join("alice").join("petstore.toml"), "not = [valid").unwrap();
        let store = FileSecretStore::new(dir.path());
        assert!(store.get("alice", "petstore").await.is_empty());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let store = FileSecretStore::new(dir.path());
        assert!(matches!(
            store.store("..", "petstore", api_key("x")).await,
            Err(StoreError::InvalidKey(_))
        ));
        assert!(store.get("alice", "../etc").await.is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemorySecretStore::new();
        store.store("alice", "petstore", api_key("k")).await.unwrap();
        assert_eq!(store.get("alice", "petstore").await, api_key("k"));
        assert!(store.delete("alice", "petstore").await.unwrap());
        assert!(store.get("alice", "petstore").await.is_empty());
    }
}
