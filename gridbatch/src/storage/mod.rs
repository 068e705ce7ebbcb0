//! Communication storage used to exchange files with remote environments.
//!
//! Every execution attempt stages its inputs into a communication directory
//! on a storage reachable by both the engine and the remote runtime. The
//! [`CommunicationStorage`] trait is the contract the engine relies on;
//! [`LocalStorage`] implements it on a local (or network-mounted) directory.

mod local;

pub use local::LocalStorage;

use crate::execution::ExecutionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::Path;

/// Location of a file or directory inside a communication storage.
///
/// URIs are `/`-separated; [`StorageUri::join`] appends a path segment.
#[derive(Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageUri(String);

impl StorageUri {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Returns a child location.
    pub fn join(&self, segment: &str) -> Self {
        let base = self.0.trim_end_matches('/');
        let segment = segment.trim_start_matches('/');
        if base.is_empty() {
            Self(segment.to_string())
        } else {
            Self(format!("{}/{}", base, segment))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageUri({})", self.0)
    }
}

impl fmt::Display for StorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a storage for logging and lookup.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct StorageDescription(String);

impl StorageDescription {
    pub fn new(description: impl Into<String>) -> Self {
        Self(description.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage shared between the engine and a remote environment.
///
/// All operations are async and may contact a remote service.
pub trait CommunicationStorage: Send + Sync + 'static {
    /// Returns the description identifying this storage.
    fn description(&self) -> &StorageDescription;

    /// Returns the directory under which communication directories are created.
    fn root(&self) -> &StorageUri;

    /// Creates a directory (and any missing parents).
    fn make_dir(&self, uri: &StorageUri) -> impl Future<Output = Result<(), ExecutionError>> + Send;

    /// Copies a local file to the storage.
    ///
    /// Returns the number of bytes transferred.
    fn upload(
        &self,
        local: &Path,
        uri: &StorageUri,
    ) -> impl Future<Output = Result<u64, ExecutionError>> + Send;

    /// Writes a whole file.
    fn write(
        &self,
        uri: &StorageUri,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<(), ExecutionError>> + Send;

    /// Reads a whole file.
    fn read(&self, uri: &StorageUri) -> impl Future<Output = Result<Vec<u8>, ExecutionError>> + Send;

    /// Removes a file, or a directory when `recursive` is set.
    fn remove(
        &self,
        uri: &StorageUri,
        recursive: bool,
    ) -> impl Future<Output = Result<(), ExecutionError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_join() {
        let root = StorageUri::new("/srv/comm/");
        assert_eq!(root.join("job-1").as_str(), "/srv/comm/job-1");
        assert_eq!(root.join("/job-1").join("input.json").as_str(), "/srv/comm/job-1/input.json");
    }

    #[test]
    fn test_uri_join_on_empty_root() {
        let root = StorageUri::new("");
        assert_eq!(root.join("a").as_str(), "a");
    }

    #[test]
    fn test_uri_serializes_as_string() {
        let uri = StorageUri::new("s/a");
        assert_eq!(serde_json::to_string(&uri).unwrap(), "\"s/a\"");
    }
}
