//! S3 blob store over the REST API.
//!
//! Uses virtual-hosted addressing against AWS by default and path-style
//! addressing when a custom endpoint (MinIO, LocalStack, ...) is set.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, StatusCode, Url};
use tracing::debug;

use super::sigv4::{sha256_hex, uri_encode, Credentials, SignableRequest, Signer};
use super::{Acl, BlobStore, StorageError};

/// Per-request limit; long enough for a build upload
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Where a key lives on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    scheme: String,
    host: String,
    canonical_uri: String,
}

impl Target {
    fn url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.canonical_uri)
    }
}

/// S3 client bound to one bucket
pub struct S3BlobStore {
    bucket: String,
    region: String,
    endpoint: Option<Url>,
    signer: Signer,
    client: reqwest::Client,
}

impl S3BlobStore {
    /// Create a store for `bucket`. `endpoint` switches to path-style
    /// addressing against an S3-compatible server.
    pub fn new(
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<&str>,
        credentials: Credentials,
    ) -> Result<Self, StorageError> {
        let region = region.into();
        let endpoint = match endpoint {
            Some(raw) => Some(Url::parse(raw).map_err(|e| StorageError::Rejected {
                operation: "configure",
                key: raw.to_string(),
                status: 0,
                message: format!("invalid endpoint: {}", e),
            })?),
            None => None,
        };

        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            bucket: bucket.into(),
            signer: Signer::new(credentials, region.clone()),
            region,
            endpoint,
            client,
        })
    }

    fn target(&self, key: &str) -> Target {
        let encoded_key = uri_encode(key, false);
        match &self.endpoint {
            Some(endpoint) => {
                let host = match (endpoint.host_str(), endpoint.port()) {
                    (Some(h), Some(p)) => format!("{}:{}", h, p),
                    (Some(h), None) => h.to_string(),
                    (None, _) => String::new(),
                };
                Target {
                    scheme: endpoint.scheme().to_string(),
                    host,
                    canonical_uri: format!("/{}/{}", uri_encode(&self.bucket, true), encoded_key),
                }
            }
            None => Target {
                scheme: "https".to_string(),
                host: format!("{}.s3.{}.amazonaws.com", self.bucket, self.region),
                canonical_uri: format!("/{}", encoded_key),
            },
        }
    }

    async fn send(
        &self,
        method: Method,
        key: &str,
        headers: BTreeMap<String, String>,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, StorageError> {
        let target = self.target(key);
        let payload_sha256 = sha256_hex(body.as_deref().unwrap_or_default());

        let signed = self.signer.sign_headers(
            &SignableRequest {
                method: method.as_str(),
                host: &target.host,
                canonical_uri: &target.canonical_uri,
                headers: headers.clone(),
                payload_sha256: &payload_sha256,
            },
            Utc::now(),
        )?;

        debug!(method = %method, url = %target.url(), "S3 request");

        let mut request = self.client.request(method, target.url());
        for (name, value) in headers.into_iter().chain(signed) {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        Ok(request.send().await?)
    }
}

async fn rejection(operation: &'static str, key: &str, response: reqwest::Response) -> StorageError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    StorageError::Rejected {
        operation,
        key: key.to_string(),
        status,
        message,
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn name(&self) -> &str {
        "s3"
    }

    async fn put(&self, key: &str, body: Vec<u8>, acl: Acl) -> Result<(), StorageError> {
        let mut headers = BTreeMap::new();
        headers.insert("x-amz-acl".to_string(), acl.as_header().to_string());

        let response = self.send(Method::PUT, key, headers, Some(body)).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(rejection("put", key, response).await)
        }
    }

    async fn head(&self, key: &str) -> Result<bool, StorageError> {
        let response = self.send(Method::HEAD, key, BTreeMap::new(), None).await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(rejection("head", key, response).await),
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.send(Method::GET, key, BTreeMap::new(), None).await?;
        match response.status() {
            s if s.is_success() => Ok(response.bytes().await?.to_vec()),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            _ => Err(rejection("get", key, response).await),
        }
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        let target = self.target(key);
        let query = self
            .signer
            .presign_query(&target.host, &target.canonical_uri, ttl, Utc::now())?;
        Ok(format!("{}?{}", target.url(), query))
    }
}
