//! The packaged build and its published retrieval handle.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A packaged build archive on local disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Path of the archive file
    pub local_path: PathBuf,

    /// Size in bytes
    pub size: u64,
}

impl Artifact {
    pub fn new(local_path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            local_path: local_path.into(),
            size,
        }
    }

    /// File name component of the archive path
    pub fn file_name(&self) -> Option<&str> {
        self.local_path.file_name().and_then(|n| n.to_str())
    }
}

/// A time-limited retrieval URL for a published artifact.
///
/// Forwarded opaquely to the workflow; never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedHandle {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

impl PublishedHandle {
    pub fn new(url: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_file_name() {
        let artifact = Artifact::new("/tmp/work/run-1.zip", 42);
        assert_eq!(artifact.file_name(), Some("run-1.zip"));
        assert_eq!(artifact.size, 42);
    }

    #[test]
    fn test_handle_serializes_expiry_as_rfc3339() {
        let expires_at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let handle = PublishedHandle::new("https://example.com/x", expires_at);
        let json = serde_json::to_value(&handle).unwrap();
        assert_eq!(json["url"], "https://example.com/x");
        assert_eq!(json["expires_at"], "2024-05-01T12:00:00Z");
    }
}
