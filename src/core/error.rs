//! Error taxonomy of a relayed run.
//!
//! Every variant of [`RunError`] is terminal for the run and maps to a
//! distinct non-zero process exit code.

use std::path::PathBuf;

use thiserror::Error;

use crate::adapters::{PackagingError, StorageError, WorkflowError};
use crate::config::ConfigError;
use crate::domain::{Conclusion, RemoteRunId};

/// Failure to publish the artifact.
///
/// Read, upload and signing failures all collapse into this one type so
/// the orchestrator has a single publish failure path.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("cannot read artifact '{path}': {source}")]
    ReadArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact path '{path}' has no usable file name")]
    InvalidFileName { path: PathBuf },

    #[error("retrieval URL lifetime of {}s is out of range", ttl.as_secs())]
    InvalidTtl { ttl: std::time::Duration },

    #[error("upload of '{key}' failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("signing retrieval URL for '{key}' failed: {source}")]
    Sign {
        key: String,
        #[source]
        source: StorageError,
    },
}

/// The remote workflow system rejected or never received the trigger
#[derive(Debug, Error)]
#[error("workflow dispatch failed: {0}")]
pub struct DispatchError(#[from] pub WorkflowError);

/// Terminal failure of a relayed run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("packaging failed: {0}")]
    Packaging(#[from] PackagingError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("sync marker '{key}' did not appear after {attempts} checks")]
    RendezvousTimeout { key: String, attempts: u32 },

    #[error("sync marker '{key}' does not hold a run id: {content:?}")]
    MalformedMarker { key: String, content: String },

    #[error("run {remote_run_id} did not complete after {attempts} status checks")]
    PollTimeout {
        remote_run_id: RemoteRunId,
        attempts: u32,
    },

    #[error(
        "run {remote_run_id} concluded with {}",
        .conclusion.as_ref().map(|c| c.to_string()).unwrap_or_else(|| "no conclusion".to_string())
    )]
    UnfavorableConclusion {
        remote_run_id: RemoteRunId,
        conclusion: Option<Conclusion>,
    },
}

impl RunError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::UnfavorableConclusion { .. } => 1,
            RunError::Config(_) => 2,
            RunError::Packaging(_) => 3,
            RunError::Publish(_) => 4,
            RunError::Dispatch(_) => 5,
            RunError::RendezvousTimeout { .. } | RunError::MalformedMarker { .. } => 6,
            RunError::PollTimeout { .. } => 7,
        }
    }

    /// Short label printed in the final `RESULT:` line
    pub fn verdict(&self) -> String {
        match self {
            RunError::UnfavorableConclusion { conclusion, .. } => conclusion
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string()),
            RunError::PollTimeout { .. } => "timeout".to_string(),
            RunError::RendezvousTimeout { .. } => "not_synced".to_string(),
            _ => "error".to_string(),
        }
    }
}
