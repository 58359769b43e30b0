//! Status of a remote workflow run as reported by the workflow service.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a remote run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Requested,
    Queued,
    Pending,
    Waiting,
    InProgress,
    Completed,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::Requested => "requested",
            RunState::Queued => "queued",
            RunState::Pending => "pending",
            RunState::Waiting => "waiting",
            RunState::InProgress => "in_progress",
            RunState::Completed => "completed",
            RunState::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Final verdict of a completed run.
///
/// Compared as a plain value; only `Success` counts as a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
    Neutral,
    Stale,
    StartupFailure,
    #[serde(other)]
    Unknown,
}

impl Conclusion {
    pub fn is_success(&self) -> bool {
        matches!(self, Conclusion::Success)
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Conclusion::Success => "success",
            Conclusion::Failure => "failure",
            Conclusion::Cancelled => "cancelled",
            Conclusion::Skipped => "skipped",
            Conclusion::TimedOut => "timed_out",
            Conclusion::ActionRequired => "action_required",
            Conclusion::Neutral => "neutral",
            Conclusion::Stale => "stale",
            Conclusion::StartupFailure => "startup_failure",
            Conclusion::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// One observation of a remote run.
///
/// `conclusion` is only meaningful once `state` is `Completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    #[serde(rename = "status")]
    pub state: RunState,

    #[serde(default)]
    pub conclusion: Option<Conclusion>,

    /// Browser URL of the run, when the service reports one
    #[serde(default)]
    pub html_url: Option<String>,
}

impl RunStatus {
    pub fn new(state: RunState, conclusion: Option<Conclusion>) -> Self {
        Self {
            state,
            conclusion,
            html_url: None,
        }
    }

    pub fn queued() -> Self {
        Self::new(RunState::Queued, None)
    }

    pub fn in_progress() -> Self {
        Self::new(RunState::InProgress, None)
    }

    pub fn completed(conclusion: Conclusion) -> Self {
        Self::new(RunState::Completed, Some(conclusion))
    }

    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }
}
