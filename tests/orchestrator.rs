//! Orchestrator Integration Tests
//!
//! Full runs against the in-memory store and scripted workflow service,
//! with real zip packaging on a temp directory and paused tokio time.

use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use e2e_relay::adapters::fakes::{MemoryBlobStore, ScriptedWorkflowService};
use e2e_relay::adapters::{Acl, ZipArchiver};
use e2e_relay::core::Publisher;
use e2e_relay::{
    Artifact, Conclusion, Orchestrator, RunError, RunIdentity, RunPlan, RunPolicy, RunStatus, Stage,
};
use tempfile::TempDir;

const RUN_ID: &str = "abc123";
const BUILD_KEY: &str = "build/abc123.zip";
const MARKER: &str = "sync/abc123.sync";

struct Fixture {
    _temp: TempDir,
    plan: RunPlan,
}

fn fixture(keep_artifact: bool) -> Fixture {
    let temp = TempDir::new().unwrap();
    let dist = temp.path().join("dist");
    std::fs::create_dir_all(dist.join("assets")).unwrap();
    std::fs::write(dist.join("index.html"), "<html/>").unwrap();
    std::fs::write(dist.join("assets/app.js"), "run()").unwrap();
    std::fs::write(dist.join("assets/app.css"), "body{}").unwrap();

    let plan = RunPlan {
        identity: RunIdentity::new(RUN_ID, "main"),
        source_dir: dist,
        work_dir: temp.path().join("work"),
        keep_artifact,
    };
    Fixture { _temp: temp, plan }
}

fn orchestrator(store: &Arc<MemoryBlobStore>, workflow: &Arc<ScriptedWorkflowService>) -> Orchestrator {
    Orchestrator::new(
        Arc::new(ZipArchiver::new()),
        store.clone(),
        workflow.clone(),
        RunPolicy::default(),
    )
}

fn local_archive(plan: &RunPlan) -> std::path::PathBuf {
    plan.work_dir.join(format!("{}.zip", RUN_ID))
}

fn zip_entries(bytes: Vec<u8>) -> Vec<String> {
    let zip = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut names: Vec<String> = zip.file_names().map(|n| n.to_string()).collect();
    names.sort();
    names
}

#[tokio::test(start_paused = true)]
async fn test_successful_run() {
    let fx = fixture(false);
    let store = Arc::new(MemoryBlobStore::new());
    store.appear_on_check(MARKER, 1, "12345\n");
    let workflow = Arc::new(ScriptedWorkflowService::new([
        RunStatus::in_progress(),
        RunStatus::completed(Conclusion::Success),
    ]));

    let report = orchestrator(&store, &workflow).run(&fx.plan).await;

    assert!(report.succeeded());
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.verdict(), "success");
    assert_eq!(report.stage, Stage::Completed);
    assert_eq!(report.remote_run_id.as_ref().map(|id| id.as_str()), Some("12345"));

    // Uploaded privately under the deterministic key
    assert_eq!(store.puts(), vec![(BUILD_KEY.to_string(), Acl::Private)]);
    assert_eq!(
        zip_entries(store.object(BUILD_KEY).unwrap()),
        vec!["assets/", "assets/app.css", "assets/app.js", "index.html"]
    );

    // Exactly one dispatch carrying the identity and the signed URL
    let dispatches = workflow.dispatches();
    assert_eq!(dispatches.len(), 1);
    assert_eq!(dispatches[0].run_id, RUN_ID);
    assert_eq!(dispatches[0].branch, "main");
    assert!(dispatches[0].artifact_url.contains(BUILD_KEY));

    assert_eq!(store.head_checks(MARKER).len(), 1);
    let checks = workflow.status_checks();
    assert_eq!(checks.len(), 2);
    assert!(checks.iter().all(|(id, _)| id.as_str() == "12345"));
    assert!(checks[1].1 - checks[0].1 >= Duration::from_secs(30));

    // The local archive is discarded once published
    assert!(!local_archive(&fx.plan).exists());
}

#[tokio::test(start_paused = true)]
async fn test_keep_artifact_leaves_local_archive() {
    let fx = fixture(true);
    let store = Arc::new(MemoryBlobStore::new());
    store.appear_on_check(MARKER, 1, "1");
    let workflow = Arc::new(ScriptedWorkflowService::new([RunStatus::completed(Conclusion::Success)]));

    let report = orchestrator(&store, &workflow).run(&fx.plan).await;

    assert!(report.succeeded());
    let archive = local_archive(&fx.plan);
    assert!(archive.exists());
    assert!(zip::ZipArchive::new(File::open(&archive).unwrap()).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_upload_stops_before_dispatch() {
    let fx = fixture(false);
    let store = Arc::new(MemoryBlobStore::rejecting_puts());
    let workflow = Arc::new(ScriptedWorkflowService::new([]));

    let report = orchestrator(&store, &workflow).run(&fx.plan).await;

    assert_eq!(report.terminal, Stage::Failed);
    assert_eq!(report.stage, Stage::Packaged);
    assert!(matches!(report.outcome, Err(RunError::Publish(_))));
    assert_eq!(report.exit_code(), 4);
    assert_eq!(store.presign_count(), 0);
    assert!(workflow.dispatches().is_empty());
    assert!(store.head_checks(MARKER).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_dispatch_stops_before_rendezvous() {
    let fx = fixture(false);
    let store = Arc::new(MemoryBlobStore::new());
    let workflow = Arc::new(ScriptedWorkflowService::rejecting_dispatch());

    let report = orchestrator(&store, &workflow).run(&fx.plan).await;

    assert_eq!(report.stage, Stage::Published);
    assert!(matches!(report.outcome, Err(RunError::Dispatch(_))));
    assert_eq!(report.exit_code(), 5);
    // Nothing is rolled back
    assert!(store.object(BUILD_KEY).is_some());
    assert!(store.head_checks(MARKER).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_marker_times_out_without_status_polls() {
    let fx = fixture(false);
    let store = Arc::new(MemoryBlobStore::new());
    let workflow = Arc::new(ScriptedWorkflowService::new([]));

    let report = orchestrator(&store, &workflow).run(&fx.plan).await;

    assert_eq!(report.stage, Stage::Dispatched);
    assert!(matches!(
        report.outcome,
        Err(RunError::RendezvousTimeout { attempts: 60, .. })
    ));
    assert_eq!(report.exit_code(), 6);
    assert_eq!(report.verdict(), "not_synced");
    assert!(report.remote_run_id.is_none());
    assert_eq!(store.head_checks(MARKER).len(), 60);
    assert!(workflow.status_checks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_marker_fails_fast() {
    let fx = fixture(false);
    let store = Arc::new(MemoryBlobStore::new());
    store.appear_on_check(MARKER, 2, "<Error>NoSuchKey</Error>");
    let workflow = Arc::new(ScriptedWorkflowService::new([]));

    let report = orchestrator(&store, &workflow).run(&fx.plan).await;

    assert!(matches!(report.outcome, Err(RunError::MalformedMarker { .. })));
    assert_eq!(store.head_checks(MARKER).len(), 2);
    assert!(workflow.status_checks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unfavorable_conclusion_fails_run() {
    let fx = fixture(false);
    let store = Arc::new(MemoryBlobStore::new());
    store.appear_on_check(MARKER, 3, "777");
    let workflow = Arc::new(ScriptedWorkflowService::new([
        RunStatus::queued(),
        RunStatus::completed(Conclusion::Failure),
    ]));

    let report = orchestrator(&store, &workflow).run(&fx.plan).await;

    assert_eq!(report.stage, Stage::Completed);
    assert_eq!(report.terminal, Stage::Failed);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.verdict(), "failure");
}

#[tokio::test(start_paused = true)]
async fn test_run_that_never_completes_is_poll_timeout() {
    let fx = fixture(false);
    let store = Arc::new(MemoryBlobStore::new());
    store.appear_on_check(MARKER, 1, "42");
    let workflow = Arc::new(ScriptedWorkflowService::new([RunStatus::in_progress()]));

    let report = orchestrator(&store, &workflow).run(&fx.plan).await;

    assert_eq!(report.stage, Stage::Synced);
    assert!(matches!(report.outcome, Err(RunError::PollTimeout { attempts: 10, .. })));
    assert_eq!(report.exit_code(), 7);
    assert_eq!(report.verdict(), "timeout");
    assert_eq!(workflow.status_checks().len(), 10);
}

#[tokio::test]
async fn test_republishing_overwrites_same_key() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(format!("{}.zip", RUN_ID));
    std::fs::write(&path, b"first").unwrap();
    let artifact = Artifact::new(&path, 5);

    let store = Arc::new(MemoryBlobStore::new());
    let publisher = Publisher::new(store.clone(), Duration::from_secs(3600));

    let first = publisher.upload(&artifact).await.unwrap();
    std::fs::write(&path, b"second").unwrap();
    let second = publisher.upload(&artifact).await.unwrap();

    assert_eq!(store.object_count(), 1);
    assert_eq!(store.object(BUILD_KEY).unwrap(), b"second");
    assert_ne!(first.url, second.url);
}

