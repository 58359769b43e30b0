//! Publish stage: upload the artifact and sign a retrieval URL.
//!
//! Upload and signing form one step from the caller's point of view; any
//! failure along the way becomes a single [`PublishError`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument};

use super::error::PublishError;
use crate::adapters::{Acl, BlobStore};
use crate::domain::{Artifact, PublishedHandle};

/// Reference validity window of the retrieval URL
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(3600);

/// Storage key prefix for build archives
pub const BUILD_PREFIX: &str = "build";

/// Uploads artifacts to a blob store
pub struct Publisher {
    store: Arc<dyn BlobStore>,
    ttl: Duration,
}

impl Publisher {
    pub fn new(store: Arc<dyn BlobStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Deterministic storage key for an artifact (`build/<file name>`)
    pub fn key_for(artifact: &Artifact) -> Result<String, PublishError> {
        artifact
            .file_name()
            .map(|name| format!("{}/{}", BUILD_PREFIX, name))
            .ok_or_else(|| PublishError::InvalidFileName {
                path: artifact.local_path.clone(),
            })
    }

    /// Upload `artifact` privately, overwriting any previous upload under
    /// the same key, and return a fresh presigned URL.
    #[instrument(skip(self, artifact), fields(store = self.store.name()))]
    pub async fn upload(&self, artifact: &Artifact) -> Result<PublishedHandle, PublishError> {
        let key = Self::key_for(artifact)?;
        let invalid_ttl = || PublishError::InvalidTtl { ttl: self.ttl };
        let validity = chrono::Duration::from_std(self.ttl).map_err(|_| invalid_ttl())?;

        let body = tokio::fs::read(&artifact.local_path)
            .await
            .map_err(|e| PublishError::ReadArtifact {
                path: artifact.local_path.clone(),
                source: e,
            })?;
        let size = body.len();

        self.store
            .put(&key, body, Acl::Private)
            .await
            .map_err(|e| PublishError::Upload {
                key: key.clone(),
                source: e,
            })?;

        let signed_at = Utc::now();
        let url = self
            .store
            .presign(&key, self.ttl)
            .await
            .map_err(|e| PublishError::Sign {
                key: key.clone(),
                source: e,
            })?;

        let expires_at = signed_at
            .checked_add_signed(validity)
            .ok_or_else(invalid_ttl)?;
        info!(%key, size_bytes = size, %expires_at, "Build uploaded");

        Ok(PublishedHandle::new(url, expires_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fakes::MemoryBlobStore;

    fn artifact_in(dir: &std::path::Path, name: &str, body: &[u8]) -> Artifact {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        Artifact::new(path, body.len() as u64)
    }

    #[tokio::test]
    async fn test_upload_stores_private_object() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(MemoryBlobStore::new());
        let publisher = Publisher::new(store.clone(), DEFAULT_PRESIGN_TTL);

        let artifact = artifact_in(temp.path(), "run-1.zip", b"PK\x03\x04zip");
        let handle = publisher.upload(&artifact).await.unwrap();

        assert_eq!(store.object("build/run-1.zip").unwrap(), b"PK\x03\x04zip");
        assert_eq!(store.puts(), vec![("build/run-1.zip".to_string(), Acl::Private)]);
        assert!(handle.url.contains("expires=3600"));

        let window = handle.expires_at - Utc::now();
        assert!(window <= chrono::Duration::seconds(3600));
        assert!(window > chrono::Duration::seconds(3500));
    }

    #[tokio::test]
    async fn test_missing_file_is_publish_error() {
        let store = Arc::new(MemoryBlobStore::new());
        let publisher = Publisher::new(store.clone(), DEFAULT_PRESIGN_TTL);

        let result = publisher
            .upload(&Artifact::new("/definitely/not/here/run.zip", 0))
            .await;
        assert!(matches!(result, Err(PublishError::ReadArtifact { .. })));
        assert!(store.puts().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_write_is_publish_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(MemoryBlobStore::rejecting_puts());
        let publisher = Publisher::new(store.clone(), DEFAULT_PRESIGN_TTL);

        let artifact = artifact_in(temp.path(), "run-1.zip", b"zip");
        let result = publisher.upload(&artifact).await;
        assert!(matches!(result, Err(PublishError::Upload { .. })));
        assert_eq!(store.presign_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_fails_before_upload() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(MemoryBlobStore::new());
        let publisher = Publisher::new(store.clone(), Duration::from_secs(u64::MAX));

        let artifact = artifact_in(temp.path(), "run-1.zip", b"zip");
        match publisher.upload(&artifact).await {
            Err(PublishError::InvalidTtl { ttl }) => assert_eq!(ttl.as_secs(), u64::MAX),
            other => panic!("expected invalid ttl, got {:?}", other),
        }
        assert!(store.puts().is_empty());
        assert_eq!(store.presign_count(), 0);
    }
}
