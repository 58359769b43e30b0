//! Domain types for the relay.
//!
//! This module contains the core data structures:
//! - Run: identity of a relayed run and its stage machine
//! - Artifact: the packaged build and its published handle
//! - Status: remote run state and conclusion

pub mod artifact;
pub mod run;
pub mod status;

// Re-export commonly used types
pub use artifact::{Artifact, PublishedHandle};
pub use run::{RemoteRunId, RunIdentity, Stage};
pub use status::{Conclusion, RunState, RunStatus};
