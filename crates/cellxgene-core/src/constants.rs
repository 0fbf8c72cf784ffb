//! Constants shared across crates.

/// Scheme of the S3-compatible object store.
pub const S3_PROTOCOL: &str = "s3";

/// Explicit scheme for local files (`file:///tmp/a.cxg`).
pub const FILE_PROTOCOL: &str = "file";

/// Separator between a URI scheme and the rest of the location.
pub const SCHEME_SEPARATOR: &str = "://";

/// Prefix of temporary files materialised from remote objects.
pub const TEMP_FILE_PREFIX: &str = "cellxgene_";

/// Response header carrying the region of an S3 bucket.
pub const BUCKET_REGION_HEADER: &str = "x-amz-bucket-region";

/// Region of the global S3 endpoint, which answers for buckets in any region.
pub const DEFAULT_S3_REGION: &str = "us-east-1";
