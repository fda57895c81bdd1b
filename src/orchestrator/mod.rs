//! The orchestrator service.
//!
//! [`OrchestratorService`] owns workflow lifecycles: it validates every
//! status change against [`crate::state_machine`], keeps at most one running
//! task per worktree, drives pipeline graphs in background tasks and
//! reconciles persisted state after a restart.

mod recovery;
mod registry;
mod runner;
mod service;

pub use recovery::{RecoveryReport, INTERRUPTED_REASON};
pub use service::{
    BatchStartResult, CreateWorkflow, Launch, OrchestratorDeps, OrchestratorService,
    OrchestratorSettings,
};

#[cfg(test)]
#[path = "tests/support.rs"]
mod support;

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod lifecycle_tests;

#[cfg(test)]
#[path = "tests/concurrency_tests.rs"]
mod concurrency_tests;

#[cfg(test)]
#[path = "tests/recovery_tests.rs"]
mod recovery_tests;

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod registry_tests;
