use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::error::IdentityError;

/// Key under which the username is persisted.
pub const STORAGE_KEY: &str = "horizonChat_username";

/// Host-provided persistent key/value storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, IdentityError>;
    async fn set_item(&self, key: &str, value: &str) -> Result<(), IdentityError>;
    async fn remove_item(&self, key: &str) -> Result<(), IdentityError>;
}

/// Process-local store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, IdentityError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), IdentityError> {
        self.items.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), IdentityError> {
        self.items.write().await.remove(key);
        Ok(())
    }
}

/// Stores all keys in one JSON object file. Writes rewrite the whole file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    async fn load(&self) -> Result<HashMap<String, String>, IdentityError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| IdentityError::StorageError(format!("Corrupt store {}: {}", self.path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(IdentityError::StorageError(e.to_string())),
        }
    }

    async fn save(&self, items: &HashMap<String, String>) -> Result<(), IdentityError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IdentityError::StorageError(e.to_string()))?;
        }
        let json = serde_json::to_vec_pretty(items)
            .map_err(|e| IdentityError::StorageError(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| IdentityError::StorageError(e.to_string()))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, IdentityError> {
        let _guard = self.lock.read().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), IdentityError> {
        let _guard = self.lock.write().await;
        let mut items = self.load().await?;
        items.insert(key.to_string(), value.to_string());
        self.save(&items).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), IdentityError> {
        let _guard = self.lock.write().await;
        let mut items = self.load().await?;
        if items.remove(key).is_some() {
            self.save(&items).await?;
        }
        Ok(())
    }
}

/// Caches the user's chosen name in front of a `KeyValueStore`.
///
/// Subscribers receive the new value after every successful set or clear.
pub struct UsernameService<S> {
    store: S,
    current: RwLock<Option<String>>,
    changes: broadcast::Sender<Option<String>>,
}

impl<S: KeyValueStore> UsernameService<S> {
    pub fn new(store: S) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            store,
            current: RwLock::new(None),
            changes,
        }
    }

    /// Cached value only; never touches the store.
    pub async fn current_username(&self) -> Option<String> {
        self.current.read().await.clone()
    }

    /// Cached value, else the stored one. Storage failures read as `None`.
    pub async fn get_username(&self) -> Option<String> {
        if let Some(name) = self.current.read().await.clone() {
            return Some(name);
        }

        match self.store.get_item(STORAGE_KEY).await {
            Ok(stored) => {
                *self.current.write().await = stored.clone();
                stored
            }
            Err(e) => {
                warn!("Failed to read username from storage: {}", e);
                None
            }
        }
    }

    pub async fn set_username(&self, username: &str) -> Result<(), IdentityError> {
        if username.trim().is_empty() {
            return Err(IdentityError::EmptyUsername);
        }

        *self.current.write().await = Some(username.to_string());

        match self.store.set_item(STORAGE_KEY, username).await {
            Ok(()) => {
                debug!("Username saved");
                self.notify(Some(username.to_string()));
            }
            Err(e) => warn!("Failed to save username to storage: {}", e),
        }
        Ok(())
    }

    pub async fn clear_username(&self) {
        *self.current.write().await = None;

        match self.store.remove_item(STORAGE_KEY).await {
            Ok(()) => {
                debug!("Username cleared");
                self.notify(None);
            }
            Err(e) => warn!("Failed to remove username from storage: {}", e),
        }
    }

    pub async fn has_username(&self) -> bool {
        self.current
            .read()
            .await
            .as_deref()
            .map_or(false, |name| !name.trim().is_empty())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Option<String>> {
        self.changes.subscribe()
    }

    fn notify(&self, value: Option<String>) {
        // No subscribers is fine.
        let _ = self.changes.send(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_set_username_writes_through() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_set_item()
            .withf(|key, value| key.to_string() == STORAGE_KEY && value.to_string() == "TestUser")
            .times(1)
            .returning(|_, _| Ok(()));
        let service = UsernameService::new(store);

        service.set_username("TestUser").await.unwrap();

        assert_eq!(service.current_username().await.as_deref(), Some("TestUser"));
        assert!(service.has_username().await);
    }

    #[tokio::test]
    async fn test_blank_username_is_rejected() {
        let mut store = MockKeyValueStore::new();
        store.expect_set_item().never();
        let service = UsernameService::new(store);

        for blank in ["", "   "] {
            assert_eq!(service.set_username(blank).await, Err(IdentityError::EmptyUsername));
        }
        assert!(!service.has_username().await);
    }

    #[tokio::test]
    async fn test_get_username_reads_store_once() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_get_item()
            .times(1)
            .returning(|_| Ok(Some("TestUser".to_string())));
        let service = UsernameService::new(store);

        assert_eq!(service.get_username().await.as_deref(), Some("TestUser"));
        assert_eq!(service.get_username().await.as_deref(), Some("TestUser"));
    }

    #[tokio::test]
    async fn test_get_username_uses_cache_after_set() {
        let mut store = MockKeyValueStore::new();
        store.expect_set_item().returning(|_, _| Ok(()));
        store.expect_get_item().never();
        let service = UsernameService::new(store);

        service.set_username("TestUser").await.unwrap();

        assert_eq!(service.get_username().await.as_deref(), Some("TestUser"));
        assert_eq!(service.get_username().await.as_deref(), Some("TestUser"));
    }

    #[tokio::test]
    async fn test_storage_failure_on_get_degrades_to_none() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_get_item()
            .returning(|_| Err(IdentityError::StorageError("storage not available".to_string())));
        let service = UsernameService::new(store);

        assert_eq!(service.get_username().await, None);
    }

    #[tokio::test]
    async fn test_clear_username_removes_from_store() {
        let mut store = MockKeyValueStore::new();
        store.expect_set_item().returning(|_, _| Ok(()));
        store
            .expect_remove_item()
            .withf(|key| key.to_string() == STORAGE_KEY)
            .times(1)
            .returning(|_| Ok(()));
        let service = UsernameService::new(store);
        service.set_username("TestUser").await.unwrap();

        service.clear_username().await;

        assert_eq!(service.current_username().await, None);
        assert!(!service.has_username().await);
    }

    #[tokio::test]
    async fn test_changes_are_broadcast() {
        let service = UsernameService::new(MemoryStore::new());
        let mut changes = service.subscribe();

        service.set_username("TestUser").await.unwrap();
        service.clear_username().await;

        assert_eq!(changes.recv().await.unwrap(), Some("TestUser".to_string()));
        assert_eq!(changes.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_notify() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_set_item()
            .returning(|_, _| Err(IdentityError::StorageError("quota exceeded".to_string())));
        let service = UsernameService::new(store);
        let mut changes = service.subscribe();

        service.set_username("TestUser").await.unwrap();

        assert_eq!(service.current_username().await.as_deref(), Some("TestUser"));
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("identity.json");

        let first = UsernameService::new(FileStore::new(&path));
        first.set_username("BraveTiger1234").await.unwrap();

        let second = UsernameService::new(FileStore::new(&path));
        assert_eq!(second.get_username().await.as_deref(), Some("BraveTiger1234"));

        second.clear_username().await;
        let third = UsernameService::new(FileStore::new(&path));
        assert_eq!(third.get_username().await, None);
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_no_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let service = UsernameService::new(FileStore::new(&path));
        assert_eq!(service.get_username().await, None);
    }
}
