//! Distributed file system client for scratch manifests and job output
//! Uses Apache Arrow object_store crate

use bytes::Bytes;
use object_store::{ObjectStore, local::LocalFileSystem, memory::InMemory};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use object_store::path::Path as StoragePath;

use crate::config::{StorageConfig, StorageProvider};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Could not open storage root {root}: {reason}")]
    InvalidRoot { root: String, reason: String },

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// One child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: StoragePath,
    pub is_dir: bool,
    pub size: u64,
}

/// Storage client wrapping object_store
///
/// Directories are implicit: a path is a directory when at least one object
/// lives underneath it and no object sits at the path itself.
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
}

impl StorageClient {
    /// Create new storage client with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// Local directory acting as the file system root
    pub fn local(root: &Path) -> Result<Self> {
        let invalid = |reason: String| StorageError::InvalidRoot {
            root: root.display().to_string(),
            reason,
        };

        std::fs::create_dir_all(root).map_err(|e| invalid(e.to_string()))?;
        let fs = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| invalid(e.to_string()))?
            .with_automatic_cleanup(true);

        Ok(Self::new(Arc::new(fs)))
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.provider {
            StorageProvider::Memory => Ok(Self::in_memory()),
            StorageProvider::Local => Self::local(&config.root),
        }
    }

    /// Write (or replace) an object
    pub async fn put(&self, path: &StoragePath, data: Bytes) -> Result<()> {
        let size = data.len();
        self.store.put(path, data.into()).await?;

        tracing::debug!(%path, size, "Wrote object");
        Ok(())
    }

    /// Read a whole object
    pub async fn get(&self, path: &StoragePath) -> Result<Bytes> {
        let result = match self.store.get(path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let bytes = result.bytes().await?;
        tracing::debug!(%path, size = bytes.len(), "Read object");
        Ok(bytes)
    }

    /// Check if an object exists at exactly this path
    pub async fn exists(&self, path: &StoragePath) -> Result<bool> {
        match self.store.head(path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn is_dir(&self, path: &StoragePath) -> Result<bool> {
        if self.exists(path).await? {
            return Ok(false);
        }
        let listing = self.store.list_with_delimiter(Some(path)).await?;
        Ok(!listing.objects.is_empty() || !listing.common_prefixes.is_empty())
    }

    /// Immediate children of a directory
    pub async fn list(&self, dir: &StoragePath) -> Result<Vec<Entry>> {
        let listing = self.store.list_with_delimiter(Some(dir)).await?;

        let dirs = listing.common_prefixes.into_iter().map(|path| Entry {
            path,
            is_dir: true,
            size: 0,
        });
        let files = listing.objects.into_iter().map(|meta| Entry {
            path: meta.location,
            is_dir: false,
            size: meta.size,
        });

        Ok(dirs.chain(files).collect())
    }

    /// Delete an object or a whole directory tree. Missing paths are not an error.
    ///
    /// Returns the number of objects removed.
    pub async fn delete_recursive(&self, path: &StoragePath) -> Result<usize> {
        let mut deleted = 0;

        if self.delete_object(path).await? {
            deleted += 1;
        }

        let mut pending = vec![path.clone()];
        while let Some(dir) = pending.pop() {
            let listing = self.store.list_with_delimiter(Some(&dir)).await?;
            for meta in listing.objects {
                if self.delete_object(&meta.location).await? {
                    deleted += 1;
                }
            }
            pending.extend(listing.common_prefixes);
        }

        tracing::debug!(%path, deleted, "Deleted recursively");
        Ok(deleted)
    }

    async fn delete_object(&self, path: &StoragePath) -> Result<bool> {
        if !self.exists(path).await? {
            return Ok(false);
        }
        match self.store.delete(path).await {
            Ok(()) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
