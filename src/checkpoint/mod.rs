//! Checkpoint persistence for pipeline execution state.
//!
//! A checkpoint is the last state snapshot of a workflow's pipeline run plus
//! the node execution should continue at. Checkpoints are keyed by workflow ID
//! and survive process restarts so failed and blocked workflows can continue.

mod file;
mod memory;

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;

use crate::domain::{ExecutionState, OrchestratorResult, TimestampUtc, WorkflowId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifies the state shape a pipeline writes into its checkpoints.
///
/// Resume refuses a checkpoint whose state type does not match the
/// pipeline's current one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateType {
    pub name: String,
    pub version: u32,
}

impl StateType {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl std::fmt::Display for StateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@v{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub workflow_id: WorkflowId,
    pub state_type: StateType,
    /// Node to run next. `None` once the graph has reached its end.
    pub next_node: Option<String>,
    pub state: ExecutionState,
    pub steps_completed: u32,
    pub saved_at: TimestampUtc,
}

impl Checkpoint {
    pub fn is_finished(&self) -> bool {
        self.next_node.is_none()
    }
}

/// Storage for pipeline checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Returns the latest checkpoint, or `None` if the workflow has none.
    async fn read(&self, workflow_id: WorkflowId) -> OrchestratorResult<Option<Checkpoint>>;

    /// Replaces the workflow's checkpoint.
    async fn write(&self, checkpoint: &Checkpoint) -> OrchestratorResult<()>;

    /// Removes the workflow's checkpoint. Missing checkpoints are not an error.
    async fn delete(&self, workflow_id: WorkflowId) -> OrchestratorResult<()>;
}

#[cfg(test)]
#[path = "tests/checkpoint_tests.rs"]
mod tests;
