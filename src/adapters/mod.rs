//! Adapter interfaces for external systems.
//!
//! The orchestrator only talks to the outside world through three
//! collaborators:
//! - [`Archiver`]: turns a directory into a single archive file
//! - [`BlobStore`]: object storage (put/head/get/presign)
//! - [`WorkflowService`]: remote CI trigger and run status
//!
//! Production implementations live in the submodules; `fakes` holds
//! in-memory stand-ins for tests.

pub mod archiver;
pub mod fakes;
pub mod github;
pub mod s3;
pub mod sigv4;

#[cfg(test)]
mod testing;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::{RemoteRunId, RunStatus};

pub use archiver::ZipArchiver;
pub use github::GitHubWorkflows;
pub use s3::S3BlobStore;

/// Errors raised while producing an archive
#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("source directory '{path}' is unreadable: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source '{path}' is not a directory")]
    SourceNotDirectory { path: PathBuf },

    #[error("source directory '{path}' contains no files")]
    EmptySource { path: PathBuf },

    #[error("cannot create archive at '{path}': {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("archive I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("archiver task aborted: {0}")]
    Aborted(String),
}

/// Errors raised by a blob store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("storage rejected {operation} of '{key}' with status {status}: {message}")]
    Rejected {
        operation: &'static str,
        key: String,
        status: u16,
        message: String,
    },

    #[error("object '{key}' not found")]
    NotFound { key: String },

    #[error("request signing failed: {0}")]
    Signing(#[from] sigv4::SigningError),
}

/// Errors raised by a workflow service
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("workflow service returned status {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Access control applied to stored objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acl {
    Private,
}

impl Acl {
    /// Canned ACL header value
    pub fn as_header(&self) -> &'static str {
        match self {
            Acl::Private => "private",
        }
    }
}

/// Everything the remote workflow needs to start a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRequest {
    pub branch: String,
    pub run_id: String,
    pub artifact_url: String,
}

/// Produces a single archive file from a directory
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Human-readable archiver name
    fn name(&self) -> &str;

    /// Archive `source`'s contents into `destination`, returning the
    /// archive size in bytes
    async fn archive(&self, source: &Path, destination: &Path) -> Result<u64, PackagingError>;
}

/// Object storage bound to a single bucket
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Human-readable store name
    fn name(&self) -> &str;

    /// Store `body` under `key`, overwriting any existing object
    async fn put(&self, key: &str, body: Vec<u8>, acl: Acl) -> Result<(), StorageError>;

    /// Whether an object exists under `key`
    async fn head(&self, key: &str) -> Result<bool, StorageError>;

    /// Fetch the object stored under `key`
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Produce a retrieval URL for `key` valid for `ttl`
    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// Remote CI workflow trigger and status API
#[async_trait]
pub trait WorkflowService: Send + Sync {
    /// Human-readable service name
    fn name(&self) -> &str;

    /// Ask the remote system to start the workflow. Success means the
    /// request was accepted, not that a run has started.
    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), WorkflowError>;

    /// Fetch the current status of a started run
    async fn get_run(&self, id: &RemoteRunId) -> Result<RunStatus, WorkflowError>;

    /// Browser URL where the run's logs can be viewed
    fn run_url(&self, id: &RemoteRunId) -> Option<String> {
        let _ = id;
        None
    }
}
