//! Communication storage backed by a local directory.

use super::{CommunicationStorage, StorageDescription, StorageUri};
use crate::execution::ExecutionError;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A [`CommunicationStorage`] on the local filesystem.
///
/// URIs are interpreted relative to the storage base directory, so the
/// storage root is the empty URI.
#[derive(Debug)]
pub struct LocalStorage {
    base: PathBuf,
    root: StorageUri,
    description: StorageDescription,
}

impl LocalStorage {
    /// Creates a storage rooted at `base`. The directory is created lazily.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let description = StorageDescription::new(format!("file://{}", base.display()));
        Self {
            base,
            root: StorageUri::new(""),
            description,
        }
    }

    /// Returns the base directory on disk.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolves a storage URI to a local path.
    pub fn resolve(&self, uri: &StorageUri) -> PathBuf {
        let relative = uri.as_str().trim_start_matches('/');
        if relative.is_empty() {
            self.base.clone()
        } else {
            self.base.join(relative)
        }
    }

    async fn ensure_parent(path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

impl CommunicationStorage for LocalStorage {
    fn description(&self) -> &StorageDescription {
        &self.description
    }

    fn root(&self) -> &StorageUri {
        &self.root
    }

    async fn make_dir(&self, uri: &StorageUri) -> Result<(), ExecutionError> {
        tokio::fs::create_dir_all(self.resolve(uri)).await?;
        Ok(())
    }

    async fn upload(&self, local: &Path, uri: &StorageUri) -> Result<u64, ExecutionError> {
        let target = self.resolve(uri);
        Self::ensure_parent(&target).await?;
        let bytes = tokio::fs::copy(local, &target).await?;
        debug!(source = %local.display(), target = %target.display(), bytes, "Uploaded file");
        Ok(bytes)
    }

    async fn write(&self, uri: &StorageUri, data: Vec<u8>) -> Result<(), ExecutionError> {
        let target = self.resolve(uri);
        Self::ensure_parent(&target).await?;
        tokio::fs::write(&target, data).await?;
        Ok(())
    }

    async fn read(&self, uri: &StorageUri) -> Result<Vec<u8>, ExecutionError> {
        let data = tokio::fs::read(self.resolve(uri)).await?;
        Ok(data)
    }

    async fn remove(&self, uri: &StorageUri, recursive: bool) -> Result<(), ExecutionError> {
        let target = self.resolve(uri);
        let result = if recursive {
            tokio::fs::remove_dir_all(&target).await
        } else {
            tokio::fs::remove_file(&target).await
        };
        match result {
            Ok(()) => Ok(()),
            // Already gone
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
