//! Core orchestration logic.
//!
//! This module contains:
//! - Stages: package, publish, dispatch, rendezvous, completion
//! - Poll: the fixed-interval polling helper shared by both waits
//! - Error: the run failure taxonomy
//! - Orchestrator: the stage machine

pub mod completion;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod package;
pub mod poll;
pub mod publish;
pub mod rendezvous;

// Re-export commonly used types
pub use completion::{judge, CompletionPoller};
pub use dispatch::Dispatcher;
pub use error::{DispatchError, PublishError, RunError};
pub use orchestrator::{Orchestrator, RunPlan, RunPolicy, RunReport};
pub use package::Packager;
pub use poll::{poll, PollError, PollPolicy, Probe};
pub use publish::Publisher;
pub use rendezvous::RendezvousPoller;
