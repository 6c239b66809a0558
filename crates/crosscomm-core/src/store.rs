//! Object store collaborator
//!
//! The relay only carries small payloads. Files, images and folders travel
//! through an external object store addressed by string keys, and the
//! envelope carries the key. [`ObjectStore`] is the capability the offload
//! path needs; any bucket-style service can implement it.
//!
//! Two implementations ship in-tree:
//! - [`MemoryStore`]: a concurrent in-memory map, used as a test double and
//!   for clients sharing one process.
//! - [`LocalDirStore`]: a directory acting as a bucket, so clients on one
//!   machine can exchange files without a cloud account.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::errors::StoreError;
use crate::walk::{relative_files, to_key_suffix};

/// Store shared between the outbound and inbound transfer paths
pub type SharedStore = Arc<dyn ObjectStore>;

// ----------------------------------------------------------------------------
// Object Store Trait
// ----------------------------------------------------------------------------

/// Bucket-style key/value blob store
///
/// Implementations must be safe for concurrent use: one store instance serves
/// every upload and download of a client.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, replacing any existing object
    async fn put_object(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError>;

    /// Store the contents of a local file under `key`
    async fn put_file(&self, key: &str, path: &Path) -> Result<(), StoreError> {
        let data = tokio::fs::read(path).await?;
        self.put_object(key, data).await
    }

    /// Fetch the object stored under `key`
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Every key starting with `prefix`, sorted
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Remove the object stored under `key`
    async fn delete_object(&self, key: &str) -> Result<(), StoreError>;
}

// ----------------------------------------------------------------------------
// In-Memory Store
// ----------------------------------------------------------------------------

/// Object store backed by a concurrent map
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        validate_key(key)?;
        self.objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }
}

// ----------------------------------------------------------------------------
// Local Directory Store
// ----------------------------------------------------------------------------

/// Object store rooted at a local directory; keys map to relative paths
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    /// Use `root` as the bucket directory, creating it if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalDirStore {
    async fn put_object(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        debug!("Stored object {} at {}", key, path.display());
        Ok(())
    }

    async fn put_file(&self, key: &str, source: &Path) -> Result<(), StoreError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(source, &path).await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let root = self.root.clone();
        let files = tokio::task::spawn_blocking(move || relative_files(&root, false))
            .await
            .map_err(|e| StoreError::Backend {
                reason: e.to_string(),
            })??;

        Ok(files
            .iter()
            .map(|relative| to_key_suffix(relative))
            .filter(|key| key.starts_with(prefix))
            .collect())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keys are relative, `/`-separated, and may not escape the bucket
fn validate_key(key: &str) -> Result<(), StoreError> {
    let invalid = || StoreError::InvalidKey {
        key: key.to_string(),
    };
    if key.is_empty() || key.ends_with('/') || key.starts_with('/') || key.contains('\\') {
        return Err(invalid());
    }
    if Path::new(key)
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(invalid());
    }
    Ok(())
}
