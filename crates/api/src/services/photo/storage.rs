//! Durable photo storage.
//!
//! Photos are addressed by [`PhotoPath`] (`photos/<file>.jpg`) and resolve to
//! a public URL under the configured prefix. Only the `photos/` directory is
//! served; writes in progress live in `incoming/` next to it.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use roster_core::PhotoPath;

/// Directory under the storage root holding writes not yet renamed into place.
pub const INCOMING_DIR: &str = "incoming";

/// Errors from the storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Object storage for optimized thumbnails.
#[async_trait]
pub trait PhotoStorage: Send + Sync {
    /// Store `bytes` under `path`, replacing any previous object.
    async fn put(&self, path: &PhotoPath, bytes: &[u8]) -> Result<(), StorageError> {
        let target = self.local_path(path);
        let incoming = self.root.join(INCOMING_DIR);
        for dir in [target.parent(), Some(incoming.as_path())].into_iter().flatten() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| io_error(dir, e))?;
        }

        // Synced before the rename so the target is never seen empty or partial
        let partial = incoming.join(format!("{}.part", path.file_name()));
        if let Err(e) = write_synced(&partial, bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(io_error(&partial, e));
        }
        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(io_error(&target, e));
        }

        #[cfg(unix)]
        if let Some(parent) = target.parent() {
            sync_dir(parent).await.map_err(|e| io_error(parent, e))?;
        }
        Ok(())
    }

    async fn exists(&self, path: &PhotoPath) -> Result<bool, StorageError>;

    /// Delete the object under `path`. Missing objects are not an error.
    async fn delete(&self, path: &PhotoPath) -> Result<(), StorageError>;

    /// Public URL of `path`.
    fn url(&self, path: &PhotoPath) -> String;
}

/// Storage on the local filesystem, served statically under `/storage`.
#[derive(Debug, Clone)]
pub struct LocalDiskStorage {
    root: PathBuf,
    public_url: String,
}

impl LocalDiskStorage {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_owned(),
        }
    }

    /// Filesystem location of `path`.
    #[must_use]
    pub fn local_path(&self, path: &PhotoPath) -> PathBuf {
        self.root.join(path.as_str())
    }
}

fn io_error(path: &Path, source: io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Persist a rename by syncing the directory entry.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[async_trait]
impl PhotoStorage for LocalDiskStorage {
    async fn put(&self, path: &PhotoPath, bytes: &[u8]) -> Result<(), StorageError> {
        let target = self.local_path(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        // Write next to the target and rename so readers never see a partial file
        let partial = target.with_extension("jpg.part");
        if let Err(e) = tokio::fs::write(&partial, bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(io_error(&partial, e));
        }
        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(io_error(&target, e));
        }
        Ok(())
    }

    async fn exists(&self, path: &PhotoPath) -> Result<bool, StorageError> {
        let target = self.local_path(path);
        tokio::fs::try_exists(&target)
            .await
            .map_err(|e| io_error(&target, e))
    }

    async fn delete(&self, path: &PhotoPath) -> Result<(), StorageError> {
        let target = self.local_path(path);
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&target, e)),
        }
    }

    fn url(&self, path: &PhotoPath) -> String {
        format!("{}/{}", self.public_url, path.as_str())
    }
}
