//! Backend registry
//!
//! Maps protocol strings to backend factories and caches the backends they
//! build, keyed by protocol and configuration. Backends are long-lived and few,
//! so the cache never evicts.

use crate::local::LocalBackend;
use crate::traits::{Backend, LocatorError, LocatorResult};
use cellxgene_core::constants::FILE_PROTOCOL;
#[cfg(feature = "storage-s3")]
use cellxgene_core::constants::S3_PROTOCOL;
use cellxgene_core::LocatorConfig;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, Mutex, RwLock};

/// Configuration handed to a factory when a backend is built
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BackendOptions {
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

/// Cache key of a built backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendKey {
    pub protocol: String,
    pub options: BackendOptions,
}

/// Where remote objects are materialised for local access
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeOptions {
    pub temp_prefix: String,
    pub temp_dir: Option<PathBuf>,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        let config = LocatorConfig::default();
        Self {
            temp_prefix: config.temp_prefix,
            temp_dir: config.temp_dir,
        }
    }
}

/// Builds the backend for one protocol
pub trait BackendFactory: Send + Sync {
    fn create(&self, protocol: &str, options: &BackendOptions) -> LocatorResult<Arc<dyn Backend>>;
}

impl<F> BackendFactory for F
where
    F: Fn(&str, &BackendOptions) -> LocatorResult<Arc<dyn Backend>> + Send + Sync,
{
    fn create(&self, protocol: &str, options: &BackendOptions) -> LocatorResult<Arc<dyn Backend>> {
        self(protocol, options)
    }
}

/// Factory for the local filesystem backend
#[derive(Clone, Debug, Default)]
pub struct LocalBackendFactory;

impl BackendFactory for LocalBackendFactory {
    fn create(&self, _protocol: &str, _options: &BackendOptions) -> LocatorResult<Arc<dyn Backend>> {
        Ok(Arc::new(LocalBackend::new()))
    }
}

pub struct BackendRegistry {
    factories: RwLock<HashMap<String, Arc<dyn BackendFactory>>>,
    cache: Mutex<HashMap<BackendKey, Arc<dyn Backend>>>,
    endpoint: Option<String>,
    materialize: Arc<MaterializeOptions>,
}

impl BackendRegistry {
    /// Registry without any protocol
    pub fn empty() -> Self {
        BackendRegistry {
            factories: RwLock::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
            endpoint: None,
            materialize: Arc::new(MaterializeOptions::default()),
        }
    }

    /// Registry with the built-in backends, configured from `config`
    pub fn from_config(config: &LocatorConfig) -> Self {
        let mut registry = Self::empty();
        registry.endpoint = config.s3_endpoint.clone();
        registry.materialize = Arc::new(MaterializeOptions {
            temp_prefix: config.temp_prefix.clone(),
            temp_dir: config.temp_dir.clone(),
        });

        registry.register(FILE_PROTOCOL, LocalBackendFactory);
        #[cfg(feature = "storage-s3")]
        registry.register(S3_PROTOCOL, crate::s3::S3BackendFactory);

        registry
    }

    /// Register (or replace) the factory serving `protocol`
    pub fn register(&self, protocol: impl Into<String>, factory: impl BackendFactory + 'static) {
        let protocol = protocol.into();
        match self.factories.write() {
            Ok(mut factories) => {
                factories.insert(protocol.clone(), Arc::new(factory));
            }
            Err(poisoned) => {
                poisoned
                    .into_inner()
                    .insert(protocol.clone(), Arc::new(factory));
            }
        }

        // Backends built by a replaced factory must not be served anymore.
        if let Ok(mut cache) = self.cache.lock() {
            cache.retain(|key, _| key.protocol != protocol);
        }
    }

    pub fn supports(&self, protocol: &str) -> bool {
        self.factories
            .read()
            .map(|f| f.contains_key(protocol))
            .unwrap_or(false)
    }

    pub fn materialize_options(&self) -> Arc<MaterializeOptions> {
        self.materialize.clone()
    }

    /// Get the backend for `protocol` (`None` is the local filesystem),
    /// building and caching it on first use.
    pub fn backend_for(
        &self,
        protocol: Option<&str>,
        region: Option<&str>,
    ) -> LocatorResult<Arc<dyn Backend>> {
        let protocol = protocol.unwrap_or(FILE_PROTOCOL);

        let factory = self
            .factories
            .read()
            .map_err(|_| LocatorError::BackendError("Backend registry poisoned".to_string()))?
            .get(protocol)
            .cloned()
            .ok_or_else(|| LocatorError::UnsupportedProtocol(protocol.to_string()))?;

        let options = if protocol == FILE_PROTOCOL {
            BackendOptions::default()
        } else {
            BackendOptions {
                region: region.map(String::from),
                endpoint: self.endpoint.clone(),
            }
        };
        let key = BackendKey {
            protocol: protocol.to_string(),
            options,
        };

        let mut cache = self
            .cache
            .lock()
            .map_err(|_| LocatorError::BackendError("Backend cache poisoned".to_string()))?;

        if let Some(backend) = cache.get(&key) {
            return Ok(backend.clone());
        }

        let backend = factory.create(protocol, &key.options)?;
        tracing::debug!(
            protocol = %protocol,
            region = ?key.options.region,
            "Storage backend created"
        );
        cache.insert(key, backend.clone());
        Ok(backend)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::from_config(&LocatorConfig::default())
    }
}

static GLOBAL_REGISTRY: LazyLock<BackendRegistry> = LazyLock::new(|| {
    let config = LocatorConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Invalid locator configuration, using defaults");
        LocatorConfig::default()
    });
    BackendRegistry::from_config(&config)
});

/// Process-wide registry, configured from the environment on first use
pub fn global_registry() -> &'static BackendRegistry {
    &GLOBAL_REGISTRY
}
