//! cellxgene Storage Library
//!
//! This crate provides the data locator: a uniform way to address datasets by
//! native path or URI (`/data/pbmc3k.cxg`, `s3://bucket/pbmc3k.cxg`) and to
//! query and read them through the storage backend serving the protocol.
//!
//! # Backends
//!
//! Backends are looked up by protocol in a [`BackendRegistry`]:
//!
//! - **Local** (`file` or no protocol): the local filesystem
//! - **S3** (`s3`, feature `storage-s3`): AWS S3 and S3-compatible stores
//!
//! Other protocols are added with [`BackendRegistry::register`].
//!
//! # Names
//!
//! Backends receive the canonical name of a location: the native path for
//! local locations, the full URI for everything else.

pub mod handle;
pub mod local;
pub mod locator;
pub mod region;
pub mod registry;
pub mod remote;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use handle::LocalHandle;
pub use local::LocalBackend;
pub use locator::{parse_protocol_and_path, DataLocator};
#[cfg(feature = "storage-s3")]
pub use region::discover_s3_region_name;
pub use region::{discover_region_with, ProbeError, ProbeResponse, RegionProbe};
pub use registry::{
    global_registry, BackendFactory, BackendKey, BackendOptions, BackendRegistry,
    MaterializeOptions,
};
pub use remote::{ObjectStoreBackend, StoreConnector};
#[cfg(feature = "storage-s3")]
pub use s3::{S3BackendFactory, S3RegionProbe};
pub use traits::{Backend, ByteStream, LocatorError, LocatorResult, ObjectInfo, ObjectKind};
