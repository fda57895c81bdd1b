//! Persistence for workflow records and lifecycle events.
//!
//! The orchestrator owns workflow records but delegates storage to a
//! [`WorkflowRepository`]. Two implementations ship with the crate: a
//! JSON-file store for the binary and an in-memory store for tests.

mod file;
mod memory;

pub use file::FileRepository;
pub use memory::MemoryRepository;

use crate::domain::{
    OrchestratorResult, Workflow, WorkflowChanges, WorkflowId, WorkflowStatus, WorktreePath,
};
use crate::events::EventRecord;
use async_trait::async_trait;

/// Selection criteria for [`WorkflowRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    /// Empty means any status.
    pub statuses: Vec<WorkflowStatus>,
    pub worktree_path: Option<WorktreePath>,
    pub pipeline_type: Option<String>,
    pub limit: Option<usize>,
}

impl WorkflowFilter {
    pub fn matches(&self, workflow: &Workflow) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&workflow.status()))
            && self
                .worktree_path
                .as_ref()
                .is_none_or(|path| path == workflow.worktree_path())
            && self
                .pipeline_type
                .as_deref()
                .is_none_or(|pipeline| pipeline == workflow.pipeline_type())
    }

    /// Filters, orders newest first, and truncates.
    pub fn apply(&self, workflows: impl IntoIterator<Item = Workflow>) -> Vec<Workflow> {
        let mut selected: Vec<Workflow> = workflows
            .into_iter()
            .filter(|w| self.matches(w))
            .collect();
        selected.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Fails with `NotFound` for unknown IDs.
    async fn get(&self, id: WorkflowId) -> OrchestratorResult<Workflow>;

    /// Stores a new record. Fails if the ID already exists.
    async fn create(&self, workflow: &Workflow) -> OrchestratorResult<()>;

    /// Replaces an existing record.
    async fn update(&self, workflow: &Workflow) -> OrchestratorResult<()>;

    /// Applies `extras` plus the new status and returns the stored record.
    ///
    /// Does not validate the edge; callers check the transition table first.
    async fn set_status(
        &self,
        id: WorkflowId,
        status: WorkflowStatus,
        extras: WorkflowChanges,
    ) -> OrchestratorResult<Workflow>;

    async fn find_by_status(&self, statuses: &[WorkflowStatus]) -> OrchestratorResult<Vec<Workflow>>;

    async fn list(&self, filter: &WorkflowFilter) -> OrchestratorResult<Vec<Workflow>>;

    async fn append_event(&self, event: &EventRecord) -> OrchestratorResult<()>;

    /// Highest persisted sequence for the workflow, `0` if it has no events.
    async fn get_max_sequence(&self, id: WorkflowId) -> OrchestratorResult<u64>;

    /// Persisted events with `sequence > after`, ascending.
    async fn events_after(&self, id: WorkflowId, after: u64) -> OrchestratorResult<Vec<EventRecord>>;
}

#[cfg(test)]
#[path = "tests/repository_tests.rs"]
mod tests;
