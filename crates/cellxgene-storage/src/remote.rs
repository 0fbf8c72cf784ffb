//! Object store backend
//!
//! Serves `scheme://bucket/key` names from `object_store` stores. One store is
//! built per bucket on first use and reused afterwards.

use crate::traits::{Backend, ByteStream, LocatorError, LocatorResult, ObjectInfo, ObjectKind};
use async_trait::async_trait;
use cellxgene_core::constants::SCHEME_SEPARATOR;
use futures::StreamExt;
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectMeta, ObjectStore, ObjectStoreExt};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Builds the store serving one bucket.
pub type StoreConnector =
    Arc<dyn Fn(&str) -> LocatorResult<Arc<dyn ObjectStore>> + Send + Sync>;

/// Remote backend over `object_store`
pub struct ObjectStoreBackend {
    protocol: String,
    region: Option<String>,
    connector: StoreConnector,
    stores: RwLock<HashMap<String, Arc<dyn ObjectStore>>>,
}

/// A name split into its bucket and key.
struct ObjectName {
    bucket: String,
    key: String,
}

impl ObjectName {
    fn path(&self) -> Path {
        Path::from(self.key.trim_matches('/'))
    }

    fn prefix(&self) -> Option<Path> {
        let key = self.key.trim_matches('/');
        if key.is_empty() {
            None
        } else {
            Some(Path::from(key))
        }
    }
}

impl ObjectStoreBackend {
    pub fn new(protocol: impl Into<String>, region: Option<String>, connector: StoreConnector) -> Self {
        ObjectStoreBackend {
            protocol: protocol.into(),
            region,
            connector,
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Serve `bucket` from an already built store.
    pub fn with_store(self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        match self.stores.write() {
            Ok(mut stores) => {
                stores.insert(bucket.into(), store);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(bucket.into(), store);
            }
        }
        self
    }

    fn split_name(&self, name: &str) -> LocatorResult<ObjectName> {
        let rest = name
            .strip_prefix(self.protocol.as_str())
            .and_then(|s| s.strip_prefix(SCHEME_SEPARATOR))
            .ok_or_else(|| {
                LocatorError::BackendError(format!(
                    "{} is not a {}{} location",
                    name, self.protocol, SCHEME_SEPARATOR
                ))
            })?;

        let (bucket, key) = match rest.split_once('/') {
            Some((bucket, key)) => (bucket, key),
            None => (rest, ""),
        };

        if bucket.is_empty() {
            return Err(LocatorError::BackendError(format!(
                "Missing bucket name in {}",
                name
            )));
        }

        Ok(ObjectName {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    fn store_for(&self, bucket: &str) -> LocatorResult<Arc<dyn ObjectStore>> {
        let cached = match self.stores.read() {
            Ok(stores) => stores.get(bucket).cloned(),
            Err(poisoned) => poisoned.into_inner().get(bucket).cloned(),
        };
        if let Some(store) = cached {
            return Ok(store);
        }

        let store = (self.connector)(bucket)?;

        let mut stores = self
            .stores
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(stores
            .entry(bucket.to_string())
            .or_insert(store)
            .clone())
    }

    fn full_name(&self, bucket: &str, location: &Path) -> String {
        format!(
            "{}{}{}/{}",
            self.protocol, SCHEME_SEPARATOR, bucket, location
        )
    }

    fn map_error(&self, name: &str, e: ObjectStoreError) -> LocatorError {
        match e {
            ObjectStoreError::NotFound { .. } => LocatorError::NotFound(name.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    protocol = %self.protocol,
                    name = %name,
                    "Object store request failed"
                );
                LocatorError::BackendError(other.to_string())
            }
        }
    }

    async fn head(&self, name: &str, object: &ObjectName) -> LocatorResult<Option<ObjectMeta>> {
        if object.key.trim_matches('/').is_empty() {
            return Ok(None);
        }
        let store = self.store_for(&object.bucket)?;
        match store.head(&object.path()).await {
            Ok(meta) => Ok(Some(meta)),
            Err(ObjectStoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(self.map_error(name, e)),
        }
    }

    /// Entries directly below the key, objects first, then common prefixes.
    async fn children(&self, name: &str, object: &ObjectName) -> LocatorResult<Vec<String>> {
        let store = self.store_for(&object.bucket)?;
        let prefix = object.prefix();
        let listing = store
            .list_with_delimiter(prefix.as_ref())
            .await
            .map_err(|e| self.map_error(name, e))?;

        let mut results: Vec<String> = listing
            .objects
            .iter()
            .filter(|meta| Some(&meta.location) != prefix.as_ref())
            .map(|meta| self.full_name(&object.bucket, &meta.location))
            .chain(
                listing
                    .common_prefixes
                    .iter()
                    .map(|p| self.full_name(&object.bucket, p)),
            )
            .collect();
        results.sort();
        Ok(results)
    }
}

#[async_trait]
impl Backend for ObjectStoreBackend {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    async fn exists(&self, name: &str) -> LocatorResult<bool> {
        let object = self.split_name(name)?;
        if self.head(name, &object).await?.is_some() {
            return Ok(true);
        }
        match self.children(name, &object).await {
            Ok(children) => Ok(!children.is_empty() || object.prefix().is_none()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn info(&self, name: &str) -> LocatorResult<ObjectInfo> {
        let start = std::time::Instant::now();
        let object = self.split_name(name)?;

        if let Some(meta) = self.head(name, &object).await? {
            tracing::debug!(
                protocol = %self.protocol,
                name = %name,
                size_bytes = meta.size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Object metadata fetched"
            );
            return Ok(ObjectInfo {
                name: name.to_string(),
                size: Some(meta.size),
                last_modified: Some(meta.last_modified),
                kind: ObjectKind::File,
            });
        }

        // Prefixes carry no metadata of their own.
        let children = self.children(name, &object).await?;
        if children.is_empty() && object.prefix().is_some() {
            return Err(LocatorError::NotFound(name.to_string()));
        }

        Ok(ObjectInfo {
            name: name.to_string(),
            size: Some(0),
            last_modified: None,
            kind: ObjectKind::Directory,
        })
    }

    async fn is_file(&self, name: &str) -> LocatorResult<bool> {
        let object = self.split_name(name)?;
        Ok(self.head(name, &object).await?.is_some())
    }

    async fn open(&self, name: &str) -> LocatorResult<ByteStream> {
        let start = std::time::Instant::now();
        let object = self.split_name(name)?;
        let store = self.store_for(&object.bucket)?;

        let result = store
            .get(&object.path())
            .await
            .map_err(|e| self.map_error(name, e))?;

        let protocol = self.protocol.clone();
        let key = name.to_string();
        let stream = result.into_stream().map(move |res| match res {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    protocol = %protocol,
                    name = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Object stream read error"
                );
                Err(LocatorError::BackendError(e.to_string()))
            }
        });

        Ok(Box::pin(stream))
    }

    async fn list(&self, name: &str) -> LocatorResult<Vec<String>> {
        let object = self.split_name(name)?;
        let children = self.children(name, &object).await?;

        if children.is_empty() && object.prefix().is_some() {
            if self.head(name, &object).await?.is_some() {
                return Ok(vec![self.full_name(&object.bucket, &object.path())]);
            }
            return Err(LocatorError::NotFound(name.to_string()));
        }

        tracing::debug!(
            protocol = %self.protocol,
            name = %name,
            entries = children.len(),
            "Listed object prefix"
        );

        Ok(children)
    }
}
