//! Workflow status transition table.
//!
//! This module is the single authority on which status edges are legal.
//! Orchestrator entry points call [`validate_transition`] before persisting
//! any status change.

use crate::domain::{OrchestratorError, OrchestratorResult, WorkflowStatus};

/// Statuses reachable from `from` in one step.
pub fn allowed_targets(from: WorkflowStatus) -> &'static [WorkflowStatus] {
    use WorkflowStatus::*;
    match from {
        Pending => &[Planning, InProgress, Failed, Cancelled],
        Planning => &[Blocked, Failed, Cancelled],
        Blocked => &[InProgress, Planning, Failed, Cancelled],
        InProgress => &[Blocked, Completed, Failed, Cancelled],
        Failed => &[InProgress],
        Completed | Cancelled => &[],
    }
}

pub fn is_valid_transition(from: WorkflowStatus, to: WorkflowStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Returns `InvalidTransition` for edges missing from the table.
pub fn validate_transition(from: WorkflowStatus, to: WorkflowStatus) -> OrchestratorResult<()> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidTransition { from, to })
    }
}

impl WorkflowStatus {
    pub fn allowed_targets(&self) -> &'static [WorkflowStatus] {
        allowed_targets(*self)
    }

    pub fn can_transition_to(&self, to: WorkflowStatus) -> bool {
        is_valid_transition(*self, to)
    }
}
