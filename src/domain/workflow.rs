//! The workflow record owned by the orchestrator.
//!
//! A [`Workflow`] is a value: fields are private and every change goes through
//! [`Workflow::with_changes`], which returns a new record. The orchestrator
//! validates the status edge before building the change set.

use crate::domain::types::{ProfileId, TimestampUtc, WorkflowId, WorkflowStatus, WorktreePath};
use serde::{Deserialize, Serialize};

/// Domain payload carried alongside the lifecycle fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPayload {
    #[serde(default)]
    pub issue_ref: Option<String>,
    #[serde(default)]
    pub issue_text: Option<String>,
    #[serde(default)]
    pub design_ref: Option<String>,
    #[serde(default)]
    pub design_text: Option<String>,
    #[serde(default)]
    pub plan_ref: Option<String>,
    #[serde(default)]
    pub plan_summary: Option<String>,
    #[serde(default)]
    pub total_tasks: Option<u32>,
    #[serde(default)]
    pub current_task_index: u32,
    #[serde(default)]
    pub review_iteration: u32,
    #[serde(default)]
    pub task_review_iteration: u32,
    #[serde(default)]
    pub human_approved: Option<bool>,
    #[serde(default)]
    pub human_feedback: Option<String>,
}

impl WorkflowPayload {
    /// Copy of the payload with every plan-derived field cleared.
    ///
    /// Issue and design inputs are kept so planning can run again.
    pub fn without_plan(&self) -> Self {
        Self {
            issue_ref: self.issue_ref.clone(),
            issue_text: self.issue_text.clone(),
            design_ref: self.design_ref.clone(),
            design_text: self.design_text.clone(),
            ..Self::default()
        }
    }
}

/// Inputs for a new workflow record.
#[derive(Debug, Clone)]
pub struct NewWorkflow {
    pub pipeline_type: String,
    pub profile_id: ProfileId,
    pub worktree_path: WorktreePath,
    pub payload: WorkflowPayload,
}

/// Persistent workflow record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    id: WorkflowId,
    pipeline_type: String,
    profile_id: ProfileId,
    worktree_path: WorktreePath,
    status: WorkflowStatus,
    created_at: TimestampUtc,
    #[serde(default)]
    started_at: Option<TimestampUtc>,
    #[serde(default)]
    completed_at: Option<TimestampUtc>,
    #[serde(default)]
    failure_reason: Option<String>,
    #[serde(default)]
    recoverable: bool,
    #[serde(default)]
    payload: WorkflowPayload,
}

impl Workflow {
    /// Creates a fresh `pending` workflow with a new ID.
    pub fn new(new: NewWorkflow) -> Self {
        Self {
            id: WorkflowId::new(),
            pipeline_type: new.pipeline_type,
            profile_id: new.profile_id,
            worktree_path: new.worktree_path,
            status: WorkflowStatus::Pending,
            created_at: TimestampUtc::now(),
            started_at: None,
            completed_at: None,
            failure_reason: None,
            recoverable: false,
            payload: new.payload,
        }
    }

    // ========== Public Getters ==========

    pub fn id(&self) -> WorkflowId {
        self.id
    }

    /// Checkpoints are keyed by the workflow's own ID.
    pub fn checkpoint_key(&self) -> WorkflowId {
        self.id
    }

    pub fn pipeline_type(&self) -> &str {
        &self.pipeline_type
    }

    pub fn profile_id(&self) -> &ProfileId {
        &self.profile_id
    }

    pub fn worktree_path(&self) -> &WorktreePath {
        &self.worktree_path
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    pub fn created_at(&self) -> TimestampUtc {
        self.created_at
    }

    pub fn started_at(&self) -> Option<TimestampUtc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<TimestampUtc> {
        self.completed_at
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn payload(&self) -> &WorkflowPayload {
        &self.payload
    }

    /// Returns a new record with the given fields replaced.
    pub fn with_changes(&self, changes: WorkflowChanges) -> Self {
        let mut next = self.clone();
        if let Some(status) = changes.status {
            next.status = status;
        }
        if let Some(started_at) = changes.started_at {
            next.started_at = Some(started_at);
        }
        if let Some(completed_at) = changes.completed_at {
            next.completed_at = Some(completed_at);
        }
        if let Some(reason) = changes.failure_reason {
            next.failure_reason = reason;
        }
        if let Some(recoverable) = changes.recoverable {
            next.recoverable = recoverable;
        }
        if let Some(payload) = changes.payload {
            next.payload = payload;
        }
        next
    }
}

/// Field replacements for [`Workflow::with_changes`].
///
/// Unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowChanges {
    status: Option<WorkflowStatus>,
    started_at: Option<TimestampUtc>,
    completed_at: Option<TimestampUtc>,
    failure_reason: Option<Option<String>>,
    recoverable: Option<bool>,
    payload: Option<WorkflowPayload>,
}

impl WorkflowChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: WorkflowStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn started_now(mut self) -> Self {
        self.started_at = Some(TimestampUtc::now());
        self
    }

    pub fn completed_now(mut self) -> Self {
        self.completed_at = Some(TimestampUtc::now());
        self
    }

    /// Records a failure reason together with its recoverability.
    pub fn failure(mut self, reason: impl Into<String>, recoverable: bool) -> Self {
        self.failure_reason = Some(Some(reason.into()));
        self.recoverable = Some(recoverable);
        self
    }

    /// Clears error fields (used on resume).
    pub fn clear_failure(mut self) -> Self {
        self.failure_reason = Some(None);
        self.recoverable = Some(false);
        self
    }

    pub fn payload(mut self, payload: WorkflowPayload) -> Self {
        self.payload = Some(payload);
        self
    }
}
