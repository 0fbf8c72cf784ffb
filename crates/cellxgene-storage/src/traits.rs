//! Backend abstraction trait
//!
//! This module defines the Backend trait that every storage backend implements,
//! and the error type shared by the backends and the locator.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

/// Data locator errors
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LocatorError {
    /// True when the backend reported the object as missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            LocatorError::NotFound(_) => true,
            LocatorError::IoError(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type for locator operations
pub type LocatorResult<T> = Result<T, LocatorError>;

/// Sequential read of an object's content. Dropping the stream closes it.
pub type ByteStream = Pin<Box<dyn Stream<Item = LocatorResult<Bytes>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    File,
    /// A directory, or a prefix with objects below it
    Directory,
}

/// Metadata of one object, normalised across backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub name: String,
    pub size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub kind: ObjectKind,
}

/// Storage backend trait
///
/// Every method takes the canonical name of the object: a native path for
/// the local filesystem, the full `scheme://bucket/key` URI for object stores.
/// Implementations must be safe to share between concurrent callers.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Protocol this backend serves (`file`, `s3`, ...)
    fn protocol(&self) -> &str;

    /// Region the backend was explicitly configured for, if any
    fn region(&self) -> Option<&str> {
        None
    }

    /// Check whether a file, directory or prefix exists. Not-found is `Ok(false)`.
    async fn exists(&self, name: &str) -> LocatorResult<bool>;

    /// Fetch metadata. Missing objects are `LocatorError::NotFound`.
    async fn info(&self, name: &str) -> LocatorResult<ObjectInfo>;

    /// Get the size in bytes of an object
    async fn size(&self, name: &str) -> LocatorResult<u64> {
        let info = self.info(name).await?;
        info.size.ok_or_else(|| {
            LocatorError::BackendError(format!("Size is not available for {}", name))
        })
    }

    /// True only for regular files (not directories or prefixes)
    async fn is_file(&self, name: &str) -> LocatorResult<bool> {
        match self.info(name).await {
            Ok(info) => Ok(info.kind == ObjectKind::File),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Open an object for sequential streaming read
    async fn open(&self, name: &str) -> LocatorResult<ByteStream>;

    /// List the entries directly below `name`, as full names.
    ///
    /// Listing a file yields the file itself.
    async fn list(&self, name: &str) -> LocatorResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn not_found_classification() {
        assert!(LocatorError::NotFound("a".to_string()).is_not_found());
        assert!(LocatorError::IoError(io::Error::new(io::ErrorKind::NotFound, "gone")).is_not_found());
        assert!(
            !LocatorError::IoError(io::Error::new(io::ErrorKind::PermissionDenied, "no"))
                .is_not_found()
        );
        assert!(!LocatorError::BackendError("boom".to_string()).is_not_found());
    }

    #[test]
    fn unsupported_protocol_message_names_protocol() {
        let err = LocatorError::UnsupportedProtocol("gopher".to_string());
        assert_eq!(err.to_string(), "Unsupported protocol: gopher");
    }
}
