//! Domain model for orchestrated workflows.
//!
//! - **Types** (`types.rs`): identifiers, statuses, timestamps
//! - **Workflow** (`workflow.rs`): the persistent lifecycle record
//! - **Execution** (`execution.rs`): pipeline state carried in checkpoints
//! - **Errors** (`errors.rs`): errors surfaced by orchestrator entry points

pub mod errors;
pub mod execution;
pub mod types;
pub mod workflow;

pub use errors::{OrchestratorError, OrchestratorResult};
pub use execution::{ExecutionState, ReviewResult, StateUpdate};
pub use types::{
    HistoryEntry, ProfileId, TimestampUtc, WorkflowId, WorkflowStatus, WorktreePath,
};
pub use workflow::{NewWorkflow, Workflow, WorkflowChanges, WorkflowPayload};

#[cfg(test)]
#[path = "tests/model_tests.rs"]
mod model_tests;
