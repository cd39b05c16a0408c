use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex as StdMutex,
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{config, error::StoreError};

pub const KEY_ACCESS_TOKEN: &str = "access_token";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
pub const KEY_EXPIRES_AT: &str = "token_expires_at";
pub const KEY_CODE_VERIFIER: &str = "code_verifier";

/// Durable string key-value storage for session state.
///
/// The batch operations are atomic with respect to each other: a
/// `get_many` never observes half of a concurrent `set_many`. Values that
/// belong together, like the parts of a token record, must go through them.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads `keys`, returning values in the same order.
    async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError>;

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError>;

    async fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_many(&[key]).await?.pop().flatten())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_many(&[(key, value)]).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.remove_many(&[key]).await
    }
}

/// Stores all keys in a single pretty-printed JSON object on disk.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// `<data_local_dir>/segcli/session.json`
    pub fn default_location() -> Self {
        Self::new(config::data_dir().join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match async_fs::read_to_string(&self.path).await {
            Ok(json) if json.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if entries.is_empty() {
            return match async_fs::remove_file(&self.path).await {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(StoreError::Io(e)),
                _ => Ok(()),
            };
        }

        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        async_fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        Ok(keys.iter().map(|key| entries.remove(*key)).collect())
    }

    async fn set_many(&self, pairs: &[(&str, &str)]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        for (key, value) in pairs {
            entries.insert(key.to_string(), value.to_string());
        }
        self.persist(&entries).await
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        let before = entries.len();
        for key in keys {
            entries.remove(*key);
        }
        if entries.len() != before {
            self.persist(&entries).await?;
        }
        Ok(())
    }
}

/// Process-local store, used in tests and for throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: StdMutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.is_empty())
            .unwrap_or(true)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(keys.iter().map(|key| entries.get(*key).cloned()).collect())
    }

    async fn set_many(&self, pairs: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        for (key, value) in pairs {
            entries.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}
