//! Run identity and the stage machine of a relayed run.
//!
//! A run is identified by a caller-supplied `run_id` which is used as the
//! correlation key in storage and in the remote workflow's inputs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one relayed test run. Immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// Caller-supplied identifier for this run
    pub run_id: String,

    /// Branch the remote workflow is dispatched on
    pub branch: String,
}

impl RunIdentity {
    pub fn new(run_id: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            branch: branch.into(),
        }
    }

    /// File name of the packaged build (`<run_id>.zip`)
    pub fn artifact_file_name(&self) -> String {
        format!("{}.zip", self.run_id)
    }

    /// Storage key of the rendezvous marker (`sync/<run_id>.sync`)
    pub fn sync_marker_key(&self) -> String {
        format!("sync/{}.sync", self.run_id)
    }
}

/// Identifier the workflow system assigns once the run actually starts.
///
/// Only obtainable through the rendezvous marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteRunId(String);

impl RemoteRunId {
    /// Parse a marker body into a remote run id.
    ///
    /// Surrounding whitespace is trimmed. Returns `None` for empty content
    /// or anything outside `[A-Za-z0-9_-]`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let valid = trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stages of the orchestration state machine, in order.
///
/// `Succeeded` and `Failed` are terminal; every other stage must be reached
/// in sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Packaged,
    Published,
    Dispatched,
    Synced,
    Completed,
    Succeeded,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Succeeded | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Init => "init",
            Stage::Packaged => "packaged",
            Stage::Published => "published",
            Stage::Dispatched => "dispatched",
            Stage::Synced => "synced",
            Stage::Completed => "completed",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        };
        f.write_str(label)
    }
}
