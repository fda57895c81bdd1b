//! Error types for orchestrator operations.

use crate::domain::types::{WorkflowId, WorkflowStatus, WorktreePath};
use crate::driver::DriverError;

/// Errors surfaced by orchestrator entry points and their collaborators.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// No workflow with this ID exists.
    #[error("workflow {0} not found")]
    NotFound(WorkflowId),

    /// The operation is illegal for the workflow's current status.
    #[error("workflow {workflow_id} is {status}: {message}")]
    InvalidState {
        workflow_id: WorkflowId,
        status: WorkflowStatus,
        message: String,
    },

    /// Another workflow is executing against the worktree.
    #[error("worktree {worktree} is busy with workflow {occupant}")]
    ResourceBusy {
        worktree: WorktreePath,
        occupant: WorkflowId,
    },

    /// A status edge missing from the transition table was attempted.
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    /// Unknown pipeline, profile or other misconfiguration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The execution backend failed.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// The developer/reviewer loop hit its pass cap.
    #[error("review loop exhausted after {passes} passes without approval")]
    ReviewPassesExhausted { passes: u32 },

    /// Repository or checkpoint I/O failure.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl OrchestratorError {
    pub fn invalid_state(
        workflow_id: WorkflowId,
        status: WorkflowStatus,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            workflow_id,
            status,
            message: message.into(),
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
