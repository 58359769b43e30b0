//! Completion stage: poll the remote run until it reaches `completed`.

use std::convert::Infallible;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::error::RunError;
use super::poll::{poll, PollError, PollPolicy, Probe};
use crate::adapters::WorkflowService;
use crate::domain::{Conclusion, RemoteRunId};

pub struct CompletionPoller {
    workflow: Arc<dyn WorkflowService>,
    policy: PollPolicy,
}

impl CompletionPoller {
    pub fn new(workflow: Arc<dyn WorkflowService>, policy: PollPolicy) -> Self {
        Self { workflow, policy }
    }

    /// Wait for the run to complete and return its conclusion, which may be
    /// absent if the service reported none. Running out of attempts is a
    /// `PollTimeout`, never a conclusion.
    #[instrument(skip(self, id), fields(remote_run_id = %id))]
    pub async fn await_completion(&self, id: &RemoteRunId) -> Result<Option<Conclusion>, RunError> {
        let workflow = &self.workflow;

        info!(
            interval_secs = self.policy.interval.as_secs(),
            max_attempts = self.policy.max_attempts,
            max_wait_secs = self.policy.ceiling().as_secs(),
            "Checking run status"
        );
        if let Some(url) = workflow.run_url(id) {
            info!(%url, "Run logs available at {}", url);
        }

        let result: Result<Option<Conclusion>, PollError<Infallible>> =
            poll(self.policy, |attempt| async move {
                match workflow.get_run(id).await {
                    Ok(status) => {
                        info!(attempt, status = %status.state, "STATUS: {}", status.state);
                        if status.is_completed() {
                            Probe::Ready(status.conclusion)
                        } else {
                            Probe::Pending
                        }
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "Status check failed, will retry");
                        Probe::Pending
                    }
                }
            })
            .await;

        match result {
            Ok(conclusion) => Ok(conclusion),
            Err(PollError::Exhausted { attempts }) => Err(RunError::PollTimeout {
                remote_run_id: id.clone(),
                attempts,
            }),
            Err(PollError::Aborted(never)) => match never {},
        }
    }
}

/// Map a resolved conclusion to the run outcome; only `success` passes
pub fn judge(id: &RemoteRunId, conclusion: Option<Conclusion>) -> Result<Conclusion, RunError> {
    match conclusion {
        Some(conclusion) if conclusion.is_success() => Ok(conclusion),
        other => Err(RunError::UnfavorableConclusion {
            remote_run_id: id.clone(),
            conclusion: other,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fakes::ScriptedWorkflowService;
    use crate::domain::RunStatus;

    fn id() -> RemoteRunId {
        RemoteRunId::parse("12345").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_errors_count_as_pending() {
        let service = Arc::new(ScriptedWorkflowService::new([]));
        service.push_error(502);
        service.push_status(RunStatus::completed(Conclusion::Failure));

        let poller = CompletionPoller::new(service.clone(), PollPolicy::completion());
        let conclusion = poller.await_completion(&id()).await.unwrap();

        assert_eq!(conclusion, Some(Conclusion::Failure));
        assert_eq!(service.status_checks().len(), 2);
    }

    #[test]
    fn test_judge() {
        assert!(judge(&id(), Some(Conclusion::Success)).is_ok());
        assert!(matches!(
            judge(&id(), Some(Conclusion::Cancelled)),
            Err(RunError::UnfavorableConclusion { conclusion: Some(Conclusion::Cancelled), .. })
        ));
        assert!(matches!(
            judge(&id(), None),
            Err(RunError::UnfavorableConclusion { conclusion: None, .. })
        ));
    }
}
