//! In-memory fakes for the collaborator traits (testing only)
//!
//! `MemoryBlobStore`, `ScriptedWorkflowService` and `FailingArchiver`
//! satisfy the adapter contracts without any network, and record every
//! call with a `tokio::time::Instant` so tests running on paused time can
//! assert poll spacing.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{
    Acl, Archiver, BlobStore, DispatchRequest, PackagingError, StorageError, WorkflowError,
    WorkflowService,
};
use crate::domain::{RemoteRunId, RunStatus};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// MemoryBlobStore
// ---------------------------------------------------------------------------

/// An object that shows up after a number of `head` checks
#[derive(Debug)]
struct Scheduled {
    appears_on_check: u32,
    body: Vec<u8>,
}

/// In-memory blob store backed by a `HashMap<key, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    scheduled: Mutex<HashMap<String, Scheduled>>,
    head_checks: Mutex<HashMap<String, Vec<Instant>>>,
    puts: Mutex<Vec<(String, Acl)>>,
    presigned: Mutex<u64>,
    reject_puts: bool,
    stall_heads: bool,
    failing_heads: Mutex<u32>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes are all rejected
    pub fn rejecting_puts() -> Self {
        Self {
            reject_puts: true,
            ..Self::default()
        }
    }

    /// A store whose `head` calls are recorded but never answer
    pub fn unresponsive() -> Self {
        Self {
            stall_heads: true,
            ..Self::default()
        }
    }

    /// Seed an object directly
    pub fn insert(&self, key: &str, body: impl Into<Vec<u8>>) {
        lock(&self.objects).insert(key.to_string(), body.into());
    }

    /// Make `key` appear with `body` on the `check`-th `head` of that key
    pub fn appear_on_check(&self, key: &str, check: u32, body: impl Into<Vec<u8>>) {
        lock(&self.scheduled).insert(
            key.to_string(),
            Scheduled {
                appears_on_check: check,
                body: body.into(),
            },
        );
    }

    /// Fail the next `count` `head` calls with a transport-style error
    pub fn fail_next_heads(&self, count: u32) {
        *lock(&self.failing_heads) = count;
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        lock(&self.objects).len()
    }

    /// Keys and ACLs of every `put`, in order
    pub fn puts(&self) -> Vec<(String, Acl)> {
        lock(&self.puts).clone()
    }

    /// Instants of every `head` check of `key`
    pub fn head_checks(&self, key: &str) -> Vec<Instant> {
        lock(&self.head_checks).get(key).cloned().unwrap_or_default()
    }

    pub fn presign_count(&self) -> u64 {
        *lock(&self.presigned)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, key: &str, body: Vec<u8>, acl: Acl) -> Result<(), StorageError> {
        lock(&self.puts).push((key.to_string(), acl));
        if self.reject_puts {
            return Err(StorageError::Rejected {
                operation: "put",
                key: key.to_string(),
                status: 403,
                message: "AccessDenied".to_string(),
            });
        }
        lock(&self.objects).insert(key.to_string(), body);
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<bool, StorageError> {
        let check = {
            let mut checks = lock(&self.head_checks);
            let entry = checks.entry(key.to_string()).or_default();
            entry.push(Instant::now());
            entry.len() as u32
        };

        if self.stall_heads {
            std::future::pending::<()>().await;
        }

        {
            let mut failing = lock(&self.failing_heads);
            if *failing > 0 {
                *failing -= 1;
                return Err(StorageError::Rejected {
                    operation: "head",
                    key: key.to_string(),
                    status: 503,
                    message: "SlowDown".to_string(),
                });
            }
        }

        let mut scheduled = lock(&self.scheduled);
        if let Some(entry) = scheduled.get(key) {
            if check >= entry.appears_on_check {
                if let Some(entry) = scheduled.remove(key) {
                    lock(&self.objects).insert(key.to_string(), entry.body);
                }
            }
        }

        Ok(lock(&self.objects).contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        lock(&self.objects)
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        let mut counter = lock(&self.presigned);
        *counter += 1;
        Ok(format!(
            "memory://{}?expires={}&nonce={}",
            key,
            ttl.as_secs(),
            *counter
        ))
    }
}

// ---------------------------------------------------------------------------
// ScriptedWorkflowService
// ---------------------------------------------------------------------------

/// Workflow service replaying a scripted sequence of statuses.
///
/// Once the script runs out the last status repeats (or `in_progress` if
/// none was scripted).
#[derive(Debug, Default)]
pub struct ScriptedWorkflowService {
    script: Mutex<VecDeque<Result<RunStatus, u16>>>,
    last: Mutex<Option<RunStatus>>,
    dispatches: Mutex<Vec<DispatchRequest>>,
    status_checks: Mutex<Vec<(RemoteRunId, Instant)>>,
    reject_dispatch: bool,
    stall_status: bool,
}

impl ScriptedWorkflowService {
    pub fn new(statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        Self {
            script: Mutex::new(statuses.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    /// A service that refuses every dispatch
    pub fn rejecting_dispatch() -> Self {
        Self {
            reject_dispatch: true,
            ..Self::default()
        }
    }

    /// A service whose status requests are recorded but never answer
    pub fn unresponsive() -> Self {
        Self {
            stall_status: true,
            ..Self::default()
        }
    }

    /// Queue a failed status request with the given HTTP status
    pub fn push_error(&self, status: u16) {
        lock(&self.script).push_back(Err(status));
    }

    pub fn push_status(&self, status: RunStatus) {
        lock(&self.script).push_back(Ok(status));
    }

    pub fn dispatches(&self) -> Vec<DispatchRequest> {
        lock(&self.dispatches).clone()
    }

    pub fn status_checks(&self) -> Vec<(RemoteRunId, Instant)> {
        lock(&self.status_checks).clone()
    }
}

#[async_trait]
impl WorkflowService for ScriptedWorkflowService {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), WorkflowError> {
        lock(&self.dispatches).push(request.clone());
        if self.reject_dispatch {
            return Err(WorkflowError::Rejected {
                status: 401,
                message: "Bad credentials".to_string(),
            });
        }
        Ok(())
    }

    async fn get_run(&self, id: &RemoteRunId) -> Result<RunStatus, WorkflowError> {
        lock(&self.status_checks).push((id.clone(), Instant::now()));
        if self.stall_status {
            std::future::pending::<()>().await;
        }

        let next = lock(&self.script).pop_front();
        match next {
            Some(Ok(status)) => {
                *lock(&self.last) = Some(status.clone());
                Ok(status)
            }
            Some(Err(code)) => Err(WorkflowError::Rejected {
                status: code,
                message: "scripted failure".to_string(),
            }),
            None => Ok(lock(&self.last).clone().unwrap_or_else(RunStatus::in_progress)),
        }
    }

    fn run_url(&self, id: &RemoteRunId) -> Option<String> {
        Some(format!("memory://runs/{}", id))
    }
}

// ---------------------------------------------------------------------------
// FailingArchiver
// ---------------------------------------------------------------------------

/// Archiver that always reports an unreadable source
#[derive(Debug, Default)]
pub struct FailingArchiver;

#[async_trait]
impl Archiver for FailingArchiver {
    fn name(&self) -> &str {
        "failing"
    }

    async fn archive(&self, source: &Path, _destination: &Path) -> Result<u64, PackagingError> {
        Err(PackagingError::SourceUnreadable {
            path: source.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scheduled_object_appears_on_check() {
        let store = MemoryBlobStore::new();
        store.appear_on_check("sync/r.sync", 3, "42");

        assert!(!store.head("sync/r.sync").await.unwrap());
        assert!(!store.head("sync/r.sync").await.unwrap());
        assert!(store.head("sync/r.sync").await.unwrap());
        assert_eq!(store.get("sync/r.sync").await.unwrap(), b"42");
        assert_eq!(store.head_checks("sync/r.sync").len(), 3);
    }

    #[tokio::test]
    async fn test_script_repeats_last_status() {
        let service = ScriptedWorkflowService::new([RunStatus::queued()]);
        let id = RemoteRunId::parse("1").unwrap();
        assert_eq!(service.get_run(&id).await.unwrap(), RunStatus::queued());
        assert_eq!(service.get_run(&id).await.unwrap(), RunStatus::queued());
        assert_eq!(service.status_checks().len(), 2);
    }
}
