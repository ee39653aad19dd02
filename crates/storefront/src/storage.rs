//! Persisted local state.
//!
//! A small key/value store of JSON documents: the cart rows, the analytics
//! session and the webhook delivery log each live under their own key.
//! Every mutation is written through immediately. A failed write is logged
//! and the in-memory state stays authoritative; a document that fails to
//! parse is treated as absent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Key holding the cart rows.
pub const CART_KEY: &str = "atacado_cart";
/// Key holding the analytics session.
pub const ANALYTICS_KEY: &str = "atacado_analytics";
/// Key holding the webhook delivery log.
pub const DELIVERY_LOG_KEY: &str = "atacado_webhook_log";

/// Errors from the backing store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key contains characters that cannot be used as a file name.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    /// Value could not be serialized.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// String documents by key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be written.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

// =============================================================================
// FileStore
// =============================================================================

/// One `<key>.json` file per document under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        // Temp file + rename so a reader never sees a half-written document.
        let tmp = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(value.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// =============================================================================
// JSON helpers
// =============================================================================

/// Load and parse a document. Missing, unreadable and corrupt documents
/// all yield `None`; the latter two are logged.
pub async fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get(key).await {
        Ok(raw) => raw?,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to read persisted state");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "Discarding corrupt persisted state");
            None
        }
    }
}

/// [`load`], falling back to `T::default()`.
pub async fn load_or_default<T: DeserializeOwned + Default>(store: &dyn KeyValueStore, key: &str) -> T {
    load(store, key).await.unwrap_or_default()
}

/// Serialize and write a document.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub async fn save<T: Serialize + Sync>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}

/// [`save`], logging instead of returning failures.
pub async fn persist<T: Serialize + Sync>(store: &dyn KeyValueStore, key: &str, value: &T) {
    if let Err(e) = save(store, key, value).await {
        tracing::error!(key, error = %e, "Failed to persist state");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_set_get_replace() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("state")).unwrap();

        assert_eq!(store.get(CART_KEY).await.unwrap(), None);
        store.set(CART_KEY, "[]").await.unwrap();
        assert_eq!(store.get(CART_KEY).await.unwrap().as_deref(), Some("[]"));
        assert!(store.dir().join("atacado_cart.json").exists());
        assert!(!store.dir().join("atacado_cart.json.tmp").exists());

        store.set(CART_KEY, "[1]").await.unwrap();
        assert_eq!(store.get(CART_KEY).await.unwrap().as_deref(), Some("[1]"));
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.set("../escape", "x").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_document_loads_default() {
        let store = MemoryStore::new();
        store.set(CART_KEY, "{not json").await.unwrap();
        let rows: Vec<String> = load_or_default(&store, CART_KEY).await;
        assert!(rows.is_empty());
        assert!(load::<Vec<String>>(&store, CART_KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryStore::new();
        save(&store, ANALYTICS_KEY, &vec![1, 2, 3]).await.unwrap();
        let back: Vec<i32> = load_or_default(&store, ANALYTICS_KEY).await;
        assert_eq!(back, vec![1, 2, 3]);
    }
}
