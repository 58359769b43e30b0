//! Main orchestrator for a relayed run.
//!
//! Sequences package → publish → dispatch → rendezvous → completion. Each
//! stage must succeed before the next begins; the first failure moves the
//! run straight to `Failed`. Nothing already done is rolled back (an
//! uploaded but undispatched build stays in storage).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::adapters::{Archiver, BlobStore, WorkflowService};
use crate::domain::{Artifact, Conclusion, RemoteRunId, RunIdentity, Stage};

use super::completion::{judge, CompletionPoller};
use super::dispatch::Dispatcher;
use super::error::RunError;
use super::package::Packager;
use super::poll::PollPolicy;
use super::publish::{Publisher, DEFAULT_PRESIGN_TTL};
use super::rendezvous::RendezvousPoller;

/// Timing knobs of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPolicy {
    pub presign_ttl: Duration,
    pub rendezvous: PollPolicy,
    pub completion: PollPolicy,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            presign_ttl: DEFAULT_PRESIGN_TTL,
            rendezvous: PollPolicy::rendezvous(),
            completion: PollPolicy::completion(),
        }
    }
}

/// What to run
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub identity: RunIdentity,
    /// Directory to package
    pub source_dir: PathBuf,
    /// Directory the archive is written to
    pub work_dir: PathBuf,
    /// Keep the local archive after publishing
    pub keep_artifact: bool,
}

/// Final account of a run
#[derive(Debug)]
pub struct RunReport {
    /// Last non-terminal stage reached
    pub stage: Stage,
    /// `Succeeded` or `Failed`
    pub terminal: Stage,
    pub remote_run_id: Option<RemoteRunId>,
    pub outcome: Result<Conclusion, RunError>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.terminal == Stage::Succeeded
    }

    /// 0 on success, the failure's code otherwise
    pub fn exit_code(&self) -> u8 {
        match &self.outcome {
            Ok(_) => 0,
            Err(e) => e.exit_code(),
        }
    }

    /// Label for the `RESULT:` line
    pub fn verdict(&self) -> String {
        match &self.outcome {
            Ok(conclusion) => conclusion.to_string(),
            Err(e) => e.verdict(),
        }
    }
}

/// Progress through the stage machine
#[derive(Debug)]
struct Progress {
    stage: Stage,
    remote_run_id: Option<RemoteRunId>,
}

impl Progress {
    fn advance(&mut self, next: Stage) {
        debug_assert!(next > self.stage && !next.is_terminal());
        info!(from = %self.stage, to = %next, "Stage reached: {}", next);
        self.stage = next;
    }
}

/// Drives one run through every stage
pub struct Orchestrator {
    packager: Packager,
    publisher: Publisher,
    dispatcher: Dispatcher,
    rendezvous: RendezvousPoller,
    completion: CompletionPoller,
}

impl Orchestrator {
    /// Create an orchestrator from its collaborators
    pub fn new(
        archiver: Arc<dyn Archiver>,
        store: Arc<dyn BlobStore>,
        workflow: Arc<dyn WorkflowService>,
        policy: RunPolicy,
    ) -> Self {
        Self {
            packager: Packager::new(archiver),
            publisher: Publisher::new(store.clone(), policy.presign_ttl),
            dispatcher: Dispatcher::new(workflow.clone()),
            rendezvous: RendezvousPoller::new(store, policy.rendezvous),
            completion: CompletionPoller::new(workflow, policy.completion),
        }
    }

    /// Execute the run to a terminal state
    #[instrument(skip(self, plan), fields(run_id = %plan.identity.run_id, branch = %plan.identity.branch))]
    pub async fn run(&self, plan: &RunPlan) -> RunReport {
        info!("Starting relayed run");

        let mut progress = Progress {
            stage: Stage::Init,
            remote_run_id: None,
        };
        let outcome = self.drive(plan, &mut progress).await;

        let terminal = match &outcome {
            Ok(conclusion) => {
                info!(%conclusion, "Run succeeded");
                Stage::Succeeded
            }
            Err(e) => {
                error!(stage = %progress.stage, error = %e, "Run failed");
                Stage::Failed
            }
        };

        RunReport {
            stage: progress.stage,
            terminal,
            remote_run_id: progress.remote_run_id,
            outcome,
        }
    }

    async fn drive(&self, plan: &RunPlan, progress: &mut Progress) -> Result<Conclusion, RunError> {
        let identity = &plan.identity;

        let artifact = self
            .packager
            .package(identity, &plan.source_dir, &plan.work_dir)
            .await?;
        progress.advance(Stage::Packaged);

        let published = self.publisher.upload(&artifact).await;
        if !plan.keep_artifact {
            discard(&artifact).await;
        }
        let handle = published?;
        progress.advance(Stage::Published);

        self.dispatcher.dispatch(identity, &handle).await?;
        progress.advance(Stage::Dispatched);

        let remote_run_id = self.rendezvous.await_marker(identity).await?;
        progress.remote_run_id = Some(remote_run_id.clone());
        progress.advance(Stage::Synced);

        let conclusion = self.completion.await_completion(&remote_run_id).await?;
        progress.advance(Stage::Completed);

        judge(&remote_run_id, conclusion)
    }
}

/// Remove the local archive; the uploaded copy is left in storage
async fn discard(artifact: &Artifact) {
    if let Err(e) = tokio::fs::remove_file(&artifact.local_path).await {
        warn!(path = %artifact.local_path.display(), error = %e, "Failed to remove local archive");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fakes::{FailingArchiver, MemoryBlobStore, ScriptedWorkflowService};

    #[tokio::test]
    async fn test_packaging_failure_short_circuits() {
        let store = Arc::new(MemoryBlobStore::new());
        let workflow = Arc::new(ScriptedWorkflowService::new([]));
        let orchestrator = Orchestrator::new(
            Arc::new(FailingArchiver),
            store.clone(),
            workflow.clone(),
            RunPolicy::default(),
        );

        let report = orchestrator
            .run(&RunPlan {
                identity: RunIdentity::new("r", "main"),
                source_dir: PathBuf::from("/nowhere/dist"),
                work_dir: PathBuf::from("/nowhere"),
                keep_artifact: false,
            })
            .await;

        assert_eq!(report.stage, Stage::Init);
        assert_eq!(report.terminal, Stage::Failed);
        assert_eq!(report.exit_code(), 3);
        assert!(store.puts().is_empty());
        assert!(workflow.dispatches().is_empty());
    }

    #[test]
    fn test_default_policy() {
        let policy = RunPolicy::default();
        assert_eq!(policy.presign_ttl, Duration::from_secs(3600));
        assert_eq!(policy.rendezvous, PollPolicy::rendezvous());
        assert_eq!(policy.completion, PollPolicy::completion());
    }
}
