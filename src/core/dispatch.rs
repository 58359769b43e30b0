//! Dispatch stage: ask the workflow service to start a run.

use std::sync::Arc;

use tracing::{info, instrument};

use super::error::DispatchError;
use crate::adapters::{DispatchRequest, WorkflowService};
use crate::domain::{PublishedHandle, RunIdentity};

/// Fires the remote workflow. One request, no retry.
pub struct Dispatcher {
    workflow: Arc<dyn WorkflowService>,
}

impl Dispatcher {
    pub fn new(workflow: Arc<dyn WorkflowService>) -> Self {
        Self { workflow }
    }

    #[instrument(skip(self, identity, handle), fields(service = self.workflow.name(), branch = %identity.branch))]
    pub async fn dispatch(
        &self,
        identity: &RunIdentity,
        handle: &PublishedHandle,
    ) -> Result<(), DispatchError> {
        let request = DispatchRequest {
            branch: identity.branch.clone(),
            run_id: identity.run_id.clone(),
            artifact_url: handle.url.clone(),
        };

        self.workflow.dispatch(&request).await?;
        info!("Workflow dispatch accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fakes::ScriptedWorkflowService;
    use chrono::Utc;

    #[tokio::test]
    async fn test_forwards_identity_and_url() {
        let service = Arc::new(ScriptedWorkflowService::new([]));
        let dispatcher = Dispatcher::new(service.clone());

        let handle = PublishedHandle::new("memory://build/r.zip?sig", Utc::now());
        dispatcher
            .dispatch(&RunIdentity::new("r", "release"), &handle)
            .await
            .unwrap();

        assert_eq!(
            service.dispatches(),
            vec![DispatchRequest {
                branch: "release".to_string(),
                run_id: "r".to_string(),
                artifact_url: "memory://build/r.zip?sig".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_rejection_is_dispatch_error() {
        let service = Arc::new(ScriptedWorkflowService::rejecting_dispatch());
        let dispatcher = Dispatcher::new(service.clone());

        let handle = PublishedHandle::new("u", Utc::now());
        let result = dispatcher.dispatch(&RunIdentity::new("r", "main"), &handle).await;
        assert!(result.is_err());
        assert_eq!(service.dispatches().len(), 1);
    }
}
