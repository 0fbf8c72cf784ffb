//! Region discovery
//!
//! Best-effort lookup of the region hosting an S3 bucket. Discovery is
//! advisory: client errors from the probe resolve to `None`.

use crate::locator::parse_protocol_and_path;
use crate::traits::{LocatorError, LocatorResult};
use async_trait::async_trait;
use cellxgene_core::constants::{BUCKET_REGION_HEADER, S3_PROTOCOL, SCHEME_SEPARATOR};
use std::collections::HashMap;
use thiserror::Error;

/// Response of a metadata-only bucket request.
#[derive(Debug, Clone, Default)]
pub struct ProbeResponse {
    /// Response headers, names lowercased
    pub headers: HashMap<String, String>,
}

impl ProbeResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    /// The service answered with an error (forbidden, not found, redirect...)
    ///
    /// `region` is the bucket region the error response still named, as S3
    /// does when redirecting to the bucket's own region.
    #[error("Client error (status {status:?}): {message}")]
    Client {
        status: Option<u16>,
        region: Option<String>,
        message: String,
    },

    /// The request did not complete (connection, timeout, credentials)
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Issues the `HEAD bucket` request used for region discovery.
#[async_trait]
pub trait RegionProbe: Send + Sync {
    async fn head_bucket(&self, bucket: &str) -> Result<ProbeResponse, ProbeError>;
}

/// Bucket name from the host component of an `s3://bucket/key` URI.
pub fn bucket_from_uri(uri: &str) -> Option<&str> {
    let (_, rest) = uri.split_once(SCHEME_SEPARATOR)?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Discover the region of the bucket named by `uri` using `probe`.
///
/// Returns `None` without calling the probe when `uri` is not an S3 location.
pub async fn discover_region_with(
    probe: &dyn RegionProbe,
    uri: &str,
) -> LocatorResult<Option<String>> {
    let (protocol, _) = parse_protocol_and_path(uri);
    if protocol != Some(S3_PROTOCOL) {
        return Ok(None);
    }

    let Some(bucket) = bucket_from_uri(uri) else {
        tracing::warn!(uri = %uri, "No bucket in S3 URI, skipping region discovery");
        return Ok(None);
    };

    match probe.head_bucket(bucket).await {
        Ok(response) => {
            let region = response
                .header(BUCKET_REGION_HEADER)
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from);
            tracing::debug!(bucket = %bucket, region = ?region, "Bucket region discovered");
            Ok(region)
        }
        Err(ProbeError::Client {
            status,
            region: Some(region),
            ..
        }) if !region.trim().is_empty() => {
            let region = region.trim().to_string();
            tracing::debug!(
                bucket = %bucket,
                status = ?status,
                region = %region,
                "Bucket region taken from error response"
            );
            Ok(Some(region))
        }
        Err(ProbeError::Client {
            status, message, ..
        }) => {
            tracing::warn!(
                bucket = %bucket,
                status = ?status,
                error = %message,
                "Bucket region discovery failed"
            );
            Ok(None)
        }
        Err(ProbeError::Transport(message)) => Err(LocatorError::BackendError(format!(
            "Region probe for bucket {} failed: {}",
            bucket, message
        ))),
    }
}

/// Discover the AWS region of an `s3://` URI's bucket with the default AWS
/// credentials chain. Any other protocol yields `None` without network access.
#[cfg(feature = "storage-s3")]
pub async fn discover_s3_region_name(uri: &str) -> LocatorResult<Option<String>> {
    let (protocol, _) = parse_protocol_and_path(uri);
    if protocol != Some(S3_PROTOCOL) {
        return Ok(None);
    }

    let probe = crate::s3::S3RegionProbe::from_env().await;
    discover_region_with(&probe, uri).await
}
