//! Data locator
//!
//! A `DataLocator` wraps a URI or native path, binds it to the storage backend
//! serving its protocol, and exposes metadata and content access through that
//! backend.
//!
//! ```ignore
//! let locator = DataLocator::new("/tmp/foo.cxg", None)?;
//! if locator.exists().await? {
//!     println!("{}", locator.size().await?);
//!     let handle = locator.local_handle().await?;
//!     // read handle.path() ...
//! }
//! ```

use crate::handle::LocalHandle;
use crate::registry::{global_registry, BackendRegistry, MaterializeOptions};
use crate::traits::{Backend, ByteStream, LocatorError, LocatorResult};
use cellxgene_core::constants::{FILE_PROTOCOL, SCHEME_SEPARATOR};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Split a URI or path into its protocol and the rest.
///
/// Single-letter schemes are Windows drive identifiers (`G://data`), so those
/// inputs are treated as native paths.
pub fn parse_protocol_and_path(uri_or_path: &str) -> (Option<&str>, &str) {
    if let Some((protocol, path)) = uri_or_path.split_once(SCHEME_SEPARATOR) {
        if protocol.chars().count() > 1 {
            return (Some(protocol), path);
        }
    }
    (None, uri_or_path)
}

fn is_local_protocol(protocol: Option<&str>) -> bool {
    matches!(protocol, None | Some(FILE_PROTOCOL))
}

/// Absolute form of `path` against the current directory, with `.` and `..`
/// resolved lexically.
fn absolute_path(path: &str) -> std::io::Result<PathBuf> {
    let path = Path::new(path);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

fn basename(name: &str) -> String {
    name.rsplit(|c: char| c == '/' || c == std::path::MAIN_SEPARATOR)
        .next()
        .unwrap_or(name)
        .to_string()
}

#[derive(Clone)]
pub struct DataLocator {
    uri_or_path: String,
    protocol: Option<String>,
    path: String,
    cname: String,
    backend: Arc<dyn Backend>,
    materialize: Arc<MaterializeOptions>,
}

impl DataLocator {
    /// Create a locator using the process-wide backend registry.
    ///
    /// `region_name` only applies to object store protocols.
    pub fn new(uri_or_path: impl Into<String>, region_name: Option<&str>) -> LocatorResult<Self> {
        Self::with_registry(global_registry(), uri_or_path, region_name)
    }

    pub fn with_registry(
        registry: &BackendRegistry,
        uri_or_path: impl Into<String>,
        region_name: Option<&str>,
    ) -> LocatorResult<Self> {
        let uri_or_path = uri_or_path.into();
        let (protocol, path) = parse_protocol_and_path(&uri_or_path);
        let protocol = protocol.map(String::from);
        let path = path.to_string();

        let cname = if is_local_protocol(protocol.as_deref()) {
            path.clone()
        } else {
            uri_or_path.clone()
        };

        let backend = registry.backend_for(protocol.as_deref(), region_name)?;

        Ok(DataLocator {
            uri_or_path,
            protocol,
            path,
            cname,
            backend,
            materialize: registry.materialize_options(),
        })
    }

    /// Copy of `other`, sharing its backend.
    pub fn from_locator(other: &DataLocator) -> Self {
        other.clone()
    }

    pub fn uri_or_path(&self) -> &str {
        &self.uri_or_path
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name handed to the backend
    pub fn cname(&self) -> &str {
        &self.cname
    }

    /// Region the backend was explicitly configured for
    pub fn region(&self) -> Option<&str> {
        self.backend.region()
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn is_local(&self) -> bool {
        is_local_protocol(self.protocol.as_deref())
    }

    pub async fn exists(&self) -> LocatorResult<bool> {
        self.backend.exists(&self.cname).await
    }

    pub async fn size(&self) -> LocatorResult<u64> {
        self.backend.size(&self.cname).await
    }

    /// Last modification time, `None` when the object is missing or the
    /// backend keeps no such metadata.
    pub async fn last_modified(&self) -> LocatorResult<Option<DateTime<Utc>>> {
        match self.backend.info(&self.cname).await {
            Ok(info) => Ok(info.last_modified),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Absolute path of a local location. Remote locations are already
    /// absolute and are returned unchanged.
    pub fn abspath(&self) -> LocatorResult<String> {
        if self.is_local() {
            Ok(absolute_path(&self.path)?.to_string_lossy().into_owned())
        } else {
            Ok(self.uri_or_path.clone())
        }
    }

    pub async fn is_file(&self) -> LocatorResult<bool> {
        self.backend.is_file(&self.cname).await
    }

    /// Open the location for streaming read. Dropping the stream closes it.
    pub async fn open(&self) -> LocatorResult<ByteStream> {
        self.backend.open(&self.uri_or_path).await
    }

    /// Base names of the entries below this location.
    pub async fn ls(&self) -> LocatorResult<Vec<String>> {
        let entries = self.backend.list(&self.uri_or_path).await?;
        Ok(entries.iter().map(|name| basename(name)).collect())
    }

    /// Get a path readable on the local filesystem.
    ///
    /// Local locations are returned as they are. Remote objects are copied in
    /// full into a temporary file which keeps the extension of the source and
    /// is removed when the handle is released.
    pub async fn local_handle(&self) -> LocatorResult<LocalHandle> {
        if self.is_local() {
            return Ok(LocalHandle::Borrowed(PathBuf::from(&self.path)));
        }

        let start = std::time::Instant::now();
        let mut stream = self.open().await?;

        let suffix = Path::new(&self.path)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let mut builder = tempfile::Builder::new();
        builder.prefix(&self.materialize.temp_prefix).suffix(&suffix);
        let temp_file = match self.materialize.temp_dir {
            Some(ref dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        // From here on, returning early drops `temp_path`, which removes the file.
        let (file, temp_path) = temp_file.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut size_bytes: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            size_bytes += chunk.len() as u64;
        }
        drop(stream);

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tracing::info!(
            source = %self.uri_or_path,
            path = %temp_path.display(),
            size_bytes = size_bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Remote object copied to local file"
        );

        Ok(LocalHandle::Owned(temp_path))
    }

    /// Run `f` with a local path for this location, then release the handle
    /// whether `f` succeeded or not.
    pub async fn with_local_path<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LocatorError>,
    {
        let handle = self.local_handle().await.map_err(E::from)?;
        let result = f(handle.path().to_path_buf()).await;
        let closed = handle.close();

        let value = result?;
        closed.map_err(|e| E::from(LocatorError::IoError(e)))?;
        Ok(value)
    }
}

impl Display for DataLocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "DataLocator(protocol={}, cname={}, path={}, uri_or_path={})",
            self.protocol.as_deref().unwrap_or("None"),
            self.cname,
            self.path,
            self.uri_or_path
        )
    }
}

impl Debug for DataLocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("DataLocator")
            .field("uri_or_path", &self.uri_or_path)
            .field("protocol", &self.protocol)
            .field("path", &self.path)
            .field("cname", &self.cname)
            .field("backend", &self.backend.protocol())
            .finish()
    }
}
