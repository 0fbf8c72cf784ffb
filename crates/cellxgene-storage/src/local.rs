use crate::traits::{Backend, ByteStream, LocatorError, LocatorResult, ObjectInfo, ObjectKind};
use async_trait::async_trait;
use cellxgene_core::constants::{FILE_PROTOCOL, SCHEME_SEPARATOR};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::io;
use std::path::PathBuf;
use tokio::fs;

/// Local filesystem backend
#[derive(Clone, Debug, Default)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        LocalBackend
    }

    /// Convert a name to a filesystem path, accepting both native paths and
    /// `file://` URIs.
    fn name_to_path(name: &str) -> PathBuf {
        let file_prefix = format!("{}{}", FILE_PROTOCOL, SCHEME_SEPARATOR);
        PathBuf::from(name.strip_prefix(file_prefix.as_str()).unwrap_or(name))
    }

    fn map_io_error(name: &str, e: io::Error) -> LocatorError {
        match e.kind() {
            io::ErrorKind::NotFound => LocatorError::NotFound(name.to_string()),
            _ => LocatorError::BackendError(format!("{}: {}", name, e)),
        }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn protocol(&self) -> &str {
        FILE_PROTOCOL
    }

    async fn exists(&self, name: &str) -> LocatorResult<bool> {
        let path = Self::name_to_path(name);
        fs::try_exists(&path)
            .await
            .map_err(|e| Self::map_io_error(name, e))
    }

    async fn info(&self, name: &str) -> LocatorResult<ObjectInfo> {
        let path = Self::name_to_path(name);
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| Self::map_io_error(name, e))?;

        let kind = if meta.is_dir() {
            ObjectKind::Directory
        } else {
            ObjectKind::File
        };

        // Some platforms and filesystems do not record modification times.
        let last_modified = meta.modified().ok().map(DateTime::<Utc>::from);

        Ok(ObjectInfo {
            name: name.to_string(),
            size: Some(meta.len()),
            last_modified,
            kind,
        })
    }

    async fn is_file(&self, name: &str) -> LocatorResult<bool> {
        let path = Self::name_to_path(name);
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::map_io_error(name, e)),
        }
    }

    async fn open(&self, name: &str) -> LocatorResult<ByteStream> {
        let path = Self::name_to_path(name);
        let start = std::time::Instant::now();

        let file = fs::File::open(&path)
            .await
            .map_err(|e| Self::map_io_error(name, e))?;

        let reader = tokio_util::io::ReaderStream::new(file);

        let path_display = path.display().to_string();
        let stream = reader.map(move |result| {
            result.map_err(|e| {
                tracing::error!(
                    error = %e,
                    path = %path_display,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Local stream read error"
                );
                LocatorError::BackendError(format!("Failed to read chunk: {}", e))
            })
        });

        tracing::debug!(path = %path.display(), "Local file opened");

        Ok(Box::pin(stream))
    }

    async fn list(&self, name: &str) -> LocatorResult<Vec<String>> {
        let path = Self::name_to_path(name);
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| Self::map_io_error(name, e))?;

        if !meta.is_dir() {
            return Ok(vec![path.display().to_string()]);
        }

        let mut entries = fs::read_dir(&path)
            .await
            .map_err(|e| Self::map_io_error(name, e))?;

        let mut results = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::map_io_error(name, e))?
        {
            results.push(entry.path().display().to_string());
        }

        // Sort for consistent ordering
        results.sort();

        tracing::debug!(
            path = %path.display(),
            entries = results.len(),
            "Listed local directory"
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_exists_and_info() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("data.cxg");
        std::fs::write(&file_path, b"hello world").unwrap();
        let name = file_path.display().to_string();

        let backend = LocalBackend::new();
        assert!(backend.exists(&name).await.unwrap());
        assert!(backend.is_file(&name).await.unwrap());

        let info = backend.info(&name).await.unwrap();
        assert_eq!(info.size, Some(11));
        assert_eq!(info.kind, ObjectKind::File);
        assert!(info.last_modified.is_some());
        assert_eq!(backend.size(&name).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempdir().unwrap();
        let name = dir.path().join("missing.cxg").display().to_string();

        let backend = LocalBackend::new();
        assert!(!backend.exists(&name).await.unwrap());
        assert!(!backend.is_file(&name).await.unwrap());
        assert!(matches!(
            backend.info(&name).await,
            Err(LocatorError::NotFound(_))
        ));
        assert!(matches!(
            backend.size(&name).await,
            Err(LocatorError::NotFound(_))
        ));
        assert!(backend.open(&name).await.is_err());
    }

    #[tokio::test]
    async fn test_directory_is_not_file() {
        let dir = tempdir().unwrap();
        let name = dir.path().display().to_string();

        let backend = LocalBackend::new();
        assert!(backend.exists(&name).await.unwrap());
        assert!(!backend.is_file(&name).await.unwrap());
        assert_eq!(
            backend.info(&name).await.unwrap().kind,
            ObjectKind::Directory
        );
    }

    #[tokio::test]
    async fn test_file_uri_is_accepted() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("a.txt");
        std::fs::write(&file_path, b"abc").unwrap();

        let backend = LocalBackend::new();
        let uri = format!("file://{}", file_path.display());
        assert!(backend.exists(&uri).await.unwrap());
        assert_eq!(backend.size(&uri).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_open_streams_content() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("stream.bin");
        std::fs::write(&file_path, b"stream download test").unwrap();

        let backend = LocalBackend::new();
        let mut stream = backend
            .open(&file_path.display().to_string())
            .await
            .unwrap();

        let mut downloaded = Vec::new();
        while let Some(chunk) = stream.next().await {
            downloaded.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(downloaded, b"stream download test");
    }

    #[tokio::test]
    async fn test_list_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let backend = LocalBackend::new();
        let entries = backend
            .list(&dir.path().display().to_string())
            .await
            .unwrap();

        let expected: Vec<String> = ["a.txt", "b.txt", "sub"]
            .iter()
            .map(|n| dir.path().join(n).display().to_string())
            .collect();
        assert_eq!(entries, expected);
    }

    #[tokio::test]
    async fn test_list_file_returns_itself() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("only.txt");
        std::fs::write(&file_path, "x").unwrap();
        let name = file_path.display().to_string();

        let backend = LocalBackend::new();
        assert_eq!(backend.list(&name).await.unwrap(), vec![name]);
    }

    #[tokio::test]
    async fn test_list_missing_directory() {
        let backend = LocalBackend::new();
        let result = backend.list("/nonexistent/cellxgene/path").await;
        assert!(matches!(result, Err(LocatorError::NotFound(_))));
    }
}
