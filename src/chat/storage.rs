//! Persistence of the conversation list as a single JSON blob.
//!
//! The list is stored under one fixed key in a [`BlobStore`]. Reads that fail
//! or do not parse are treated as "nothing stored"; failed writes are logged
//! and dropped. The in-memory state stays authoritative either way.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use super::types::Conversation;

/// Key under which the conversation list is stored.
pub const STORAGE_KEY: &str = "chatgpt-clone-chats";

/// Boxed future type for blob store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors raised by blob store backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem access failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The key cannot be mapped to a storage location.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// Result type for blob store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// String key/value storage.
pub trait BlobStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> StoreFuture<'_, StorageResult<Option<String>>>;

    /// Replace the value stored under `key`.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: String) -> StoreFuture<'_, StorageResult<()>>;
}

/// One `<key>.json` file per key inside a directory.
#[derive(Clone, Debug)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    /// Store blobs under `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, key: &str) -> StoreFuture<'_, StorageResult<Option<String>>> {
        let path = self.path_for(key);
        Box::pin(async move {
            let path = path?;
            match tokio::fs::read_to_string(&path).await {
                Ok(contents) => Ok(Some(contents)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(StorageError::Io(err)),
            }
        })
    }

    fn set(&self, key: &str, value: String) -> StoreFuture<'_, StorageResult<()>> {
        let path = self.path_for(key);
        Box::pin(async move {
            let path = path?;
            tokio::fs::create_dir_all(&self.dir).await?;

            // Write beside the target, then rename over it.
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, value.as_bytes()).await?;
            tokio::fs::rename(&tmp, &path).await?;
            Ok(())
        })
    }
}

/// Process-local blob store, mostly for tests and ephemeral sessions.
#[derive(Clone, Debug, Default)]
pub struct MemoryBlobStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> StoreFuture<'_, StorageResult<Option<String>>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.entries.read().await.get(&key).cloned()) })
    }

    fn set(&self, key: &str, value: String) -> StoreFuture<'_, StorageResult<()>> {
        let key = key.to_string();
        Box::pin(async move {
            self.entries.write().await.insert(key, value);
            Ok(())
        })
    }
}

/// Reads and writes the conversation list under [`STORAGE_KEY`].
#[derive(Clone)]
pub struct ChatStorage {
    blobs: Arc<dyn BlobStore>,
}

impl ChatStorage {
    /// Wrap a blob store.
    #[must_use]
    pub const fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Storage backed by `<dir>/chatgpt-clone-chats.json`.
    #[must_use]
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileBlobStore::new(dir)))
    }

    /// Storage that lives only as long as the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBlobStore::new()))
    }

    /// Load the persisted list. Missing or unreadable data yields an empty list.
    pub async fn load(&self) -> Vec<Conversation> {
        let raw = match self.blobs.get(STORAGE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                error!("Error loading chats from storage: {err}");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Conversation>>(&raw) {
            Ok(conversations) => {
                debug!("Loaded {} conversations", conversations.len());
                conversations
            }
            Err(err) => {
                warn!("Stored chats are not valid JSON, starting empty: {err}");
                Vec::new()
            }
        }
    }

    /// Overwrite the persisted list. Failures are logged and ignored.
    pub async fn save(&self, conversations: &[Conversation]) {
        let payload = match serde_json::to_string(conversations) {
            Ok(payload) => payload,
            Err(err) => {
                error!("Error serializing chats: {err}");
                return;
            }
        };

        if let Err(err) = self.blobs.set(STORAGE_KEY, payload).await {
            error!("Error saving chats to storage: {err}");
        }
    }
}
