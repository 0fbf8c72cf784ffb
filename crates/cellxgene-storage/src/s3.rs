use crate::region::{ProbeError, ProbeResponse, RegionProbe};
use crate::registry::{BackendFactory, BackendOptions};
use crate::remote::{ObjectStoreBackend, StoreConnector};
use crate::traits::{Backend, LocatorError, LocatorResult};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use cellxgene_core::constants::{BUCKET_REGION_HEADER, DEFAULT_S3_REGION, S3_PROTOCOL};
use object_store::aws::AmazonS3Builder;
use object_store::ObjectStore;
use std::sync::Arc;

/// Builds S3 backends. Each backend serves every bucket for one region setting.
#[derive(Clone, Debug, Default)]
pub struct S3BackendFactory;

/// Connector building one `AmazonS3` store per bucket.
///
/// Without a region the builder falls back to `AWS_REGION` / `AWS_DEFAULT_REGION`
/// and finally to its own default.
pub fn s3_connector(region: Option<String>, endpoint_url: Option<String>) -> StoreConnector {
    Arc::new(move |bucket: &str| -> LocatorResult<Arc<dyn ObjectStore>> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

        if let Some(ref region) = region {
            builder = builder.with_region(region.clone());
        }

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| LocatorError::ConfigError(e.to_string()))?;

        tracing::debug!(
            bucket = %bucket,
            region = ?region,
            endpoint = ?endpoint_url,
            "S3 store created"
        );

        Ok(Arc::new(store))
    })
}

impl BackendFactory for S3BackendFactory {
    fn create(&self, protocol: &str, options: &BackendOptions) -> LocatorResult<Arc<dyn Backend>> {
        let connector = s3_connector(options.region.clone(), options.endpoint.clone());
        Ok(Arc::new(ObjectStoreBackend::new(
            protocol,
            options.region.clone(),
            connector,
        )))
    }
}

/// Region probe backed by the AWS SDK
pub struct S3RegionProbe {
    client: aws_sdk_s3::Client,
}

impl S3RegionProbe {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Create a probe from the ambient AWS configuration.
    ///
    /// Without a configured region the probe talks to the global endpoint.
    pub async fn from_env() -> Self {
        let region = with_global_fallback(RegionProviderChain::default_provider());
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;
        Self::new(aws_sdk_s3::Client::new(&sdk_config))
    }
}

fn with_global_fallback(chain: RegionProviderChain) -> RegionProviderChain {
    chain.or_else(DEFAULT_S3_REGION)
}

#[async_trait]
impl RegionProbe for S3RegionProbe {
    async fn head_bucket(&self, bucket: &str) -> Result<ProbeResponse, ProbeError> {
        let start = std::time::Instant::now();
        let result = self.client.head_bucket().bucket(bucket).send().await;

        match result {
            Ok(output) => {
                let mut response = ProbeResponse::default();
                if let Some(region) = output.bucket_region() {
                    response
                        .headers
                        .insert(BUCKET_REGION_HEADER.to_string(), region.to_string());
                }
                tracing::debug!(
                    protocol = S3_PROTOCOL,
                    bucket = %bucket,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 head_bucket successful"
                );
                Ok(response)
            }
            // A bucket outside the client's region answers 301 and still
            // names its region.
            Err(SdkError::ServiceError(service_error)) => Err(ProbeError::Client {
                status: Some(service_error.raw().status().as_u16()),
                region: service_error
                    .raw()
                    .headers()
                    .get(BUCKET_REGION_HEADER)
                    .map(String::from),
                message: format!("{}", DisplayErrorContext(service_error.err())),
            }),
            Err(other) => Err(ProbeError::Transport(format!(
                "{}",
                DisplayErrorContext(&other)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::discover_region_with;
    use aws_sdk_s3::config::{Credentials, Region};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// S3 stand-in answering every request with `response`.
    async fn serve_fixed_response(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 4096];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    fn probe_for(endpoint: String) -> S3RegionProbe {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .force_path_style(true)
            .credentials_provider(Credentials::new("access", "secret", None, None, "test"))
            .build();
        S3RegionProbe::new(aws_sdk_s3::Client::from_conf(config))
    }

    #[tokio::test]
    async fn test_cross_region_redirect_yields_bucket_region() {
        let endpoint = serve_fixed_response(
            "HTTP/1.1 301 Moved Permanently\r\n\
             x-amz-bucket-region: eu-west-1\r\n\
             content-length: 0\r\n\
             connection: close\r\n\r\n",
        )
        .await;
        let probe = probe_for(endpoint);

        match probe.head_bucket("my-bucket").await {
            Err(ProbeError::Client { status, region, .. }) => {
                assert_eq!(status, Some(301));
                assert_eq!(region.as_deref(), Some("eu-west-1"));
            }
            other => panic!("unexpected probe result: {:?}", other.map(|r| r.headers)),
        }

        let region = discover_region_with(&probe, "s3://my-bucket/key.cxg")
            .await
            .unwrap();
        assert_eq!(region.as_deref(), Some("eu-west-1"));
    }

    #[tokio::test]
    async fn test_same_region_reads_header() {
        let endpoint = serve_fixed_response(
            "HTTP/1.1 200 OK\r\n\
             x-amz-bucket-region: us-east-1\r\n\
             content-length: 0\r\n\
             connection: close\r\n\r\n",
        )
        .await;
        let probe = probe_for(endpoint);

        let region = discover_region_with(&probe, "s3://my-bucket/key.cxg")
            .await
            .unwrap();
        assert_eq!(region.as_deref(), Some("us-east-1"));
    }

    #[tokio::test]
    async fn test_region_falls_back_to_global_endpoint() {
        let chain = with_global_fallback(RegionProviderChain::first_try(None::<Region>));
        assert_eq!(chain.region().await, Some(Region::new(DEFAULT_S3_REGION)));

        let chain = with_global_fallback(RegionProviderChain::first_try(Region::new("eu-west-1")));
        assert_eq!(chain.region().await, Some(Region::new("eu-west-1")));
    }

    #[test]
    fn test_factory_records_region() {
        let backend = S3BackendFactory
            .create(
                S3_PROTOCOL,
                &BackendOptions {
                    region: Some("us-west-2".to_string()),
                    endpoint: None,
                },
            )
            .unwrap();
        assert_eq!(backend.protocol(), "s3");
        assert_eq!(backend.region(), Some("us-west-2"));
    }

    #[test]
    fn test_connector_builds_store_without_network() {
        let connector = s3_connector(
            Some("eu-west-1".to_string()),
            Some("http://localhost:9000".to_string()),
        );
        assert!(connector("my-bucket").is_ok());
    }
}
