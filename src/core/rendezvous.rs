//! Rendezvous stage: learn the remote run id from the sync marker.
//!
//! Dispatch acceptance says nothing about which run the workflow system
//! started. The triggered workflow writes `sync/<run_id>.sync` containing
//! its own run id early in its execution; this stage polls for that object.
//!
//! Absence and transport errors both count as "not yet". A marker whose
//! body is not a usable run id stops the loop immediately.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::error::RunError;
use super::poll::{poll, PollError, PollPolicy, Probe};
use crate::adapters::BlobStore;
use crate::domain::{RemoteRunId, RunIdentity};

const MAX_REPORTED_CONTENT: usize = 64;

pub struct RendezvousPoller {
    store: Arc<dyn BlobStore>,
    policy: PollPolicy,
}

impl RendezvousPoller {
    pub fn new(store: Arc<dyn BlobStore>, policy: PollPolicy) -> Self {
        Self { store, policy }
    }

    #[instrument(skip(self, identity), fields(run_id = %identity.run_id))]
    pub async fn await_marker(&self, identity: &RunIdentity) -> Result<RemoteRunId, RunError> {
        let key = identity.sync_marker_key();
        let store = &self.store;
        let key_ref = key.as_str();
        let max_attempts = self.policy.max_attempts;

        info!(
            %key,
            interval_secs = self.policy.interval.as_secs(),
            max_attempts,
            max_wait_secs = self.policy.ceiling().as_secs(),
            "Polling for sync marker"
        );

        let result = poll(self.policy, |attempt| async move {
            match store.head(key_ref).await {
                Ok(false) => {
                    info!(attempt, max_attempts, "Waiting for workflow to sync");
                    Probe::Pending
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Sync marker check failed, will retry");
                    Probe::Pending
                }
                Ok(true) => match store.get(key_ref).await {
                    Ok(body) => {
                        let text = String::from_utf8_lossy(&body);
                        match RemoteRunId::parse(&text) {
                            Some(id) => Probe::Ready(id),
                            None => Probe::Abort(text.chars().take(MAX_REPORTED_CONTENT).collect::<String>()),
                        }
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "Sync marker read failed, will retry");
                        Probe::Pending
                    }
                },
            }
        })
        .await;

        match result {
            Ok(id) => {
                info!(remote_run_id = %id, "Workflow synced");
                Ok(id)
            }
            Err(PollError::Exhausted { attempts }) => Err(RunError::RendezvousTimeout { key, attempts }),
            Err(PollError::Aborted(content)) => Err(RunError::MalformedMarker { key, content }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fakes::MemoryBlobStore;
    use std::time::Duration;

    fn identity() -> RunIdentity {
        RunIdentity::new("run-1", "main")
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_present_immediately() {
        let store = Arc::new(MemoryBlobStore::new());
        store.insert("sync/run-1.sync", "12345\n");

        let poller = RendezvousPoller::new(store.clone(), PollPolicy::rendezvous());
        let id = poller.await_marker(&identity()).await.unwrap();

        assert_eq!(id.as_str(), "12345");
        assert_eq!(store.head_checks("sync/run-1.sync").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_do_not_abort() {
        let store = Arc::new(MemoryBlobStore::new());
        store.fail_next_heads(2);
        store.insert("sync/run-1.sync", "999");

        let poller = RendezvousPoller::new(store.clone(), PollPolicy::new(5, Duration::from_secs(1)));
        let id = poller.await_marker(&identity()).await.unwrap();

        assert_eq!(id.as_str(), "999");
        assert_eq!(store.head_checks("sync/run-1.sync").len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_marker_fails_fast() {
        let store = Arc::new(MemoryBlobStore::new());
        store.appear_on_check("sync/run-1.sync", 2, "   \n");

        let poller = RendezvousPoller::new(store.clone(), PollPolicy::rendezvous());
        let result = poller.await_marker(&identity()).await;

        assert!(matches!(result, Err(RunError::MalformedMarker { .. })));
        assert_eq!(store.head_checks("sync/run-1.sync").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_garbage_marker_is_malformed() {
        let store = Arc::new(MemoryBlobStore::new());
        store.insert("sync/run-1.sync", "<Error>AccessDenied</Error>");

        let poller = RendezvousPoller::new(store, PollPolicy::rendezvous());
        match poller.await_marker(&identity()).await {
            Err(RunError::MalformedMarker { key, content }) => {
                assert_eq!(key, "sync/run-1.sync");
                assert!(content.contains("AccessDenied"));
            }
            other => panic!("expected malformed marker, got {:?}", other),
        }
    }
}
