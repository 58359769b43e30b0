//! e2e-relay - Remote end-to-end test relay
//!
//! Packages a build, publishes it to object storage, triggers a remote CI
//! workflow to test it, and waits for that workflow's verdict. The process
//! exit code carries the result.
//!
//! # Architecture
//!
//! The run is a strict sequence of stages:
//! - Package: zip the build directory
//! - Publish: upload the archive and sign a retrieval URL
//! - Dispatch: ask the workflow service to start a run
//! - Rendezvous: poll storage for the marker carrying the remote run id
//! - Completion: poll the remote run until it completes
//!
//! Any stage failure ends the run. The two waits share one fixed-interval
//! polling helper with a bounded attempt budget.
//!
//! # Modules
//!
//! - `adapters`: External system integrations (zip, S3, GitHub Actions)
//! - `core`: Stages, polling, errors, and the Orchestrator
//! - `domain`: Data structures (RunIdentity, Artifact, RunStatus)
//! - `config`: Config file and environment loading
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Relay the build in ./dist
//! HEROKU_TEST_RUN_ID=abc123 HEROKU_TEST_RUN_BRANCH=main GITHUB_TOKEN=... \
//!     e2e-relay run
//!
//! # Check a remote run
//! e2e-relay status 12345
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use crate::core::{Orchestrator, RunError, RunPlan, RunPolicy, RunReport};
pub use crate::domain::{Artifact, Conclusion, PublishedHandle, RemoteRunId, RunIdentity, RunState, RunStatus, Stage};
